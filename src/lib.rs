//! Composable processing blocks for seismic waveform records.
//!
//! A [`StateContainer`] bundles named sample arrays with metadata for one
//! item; blocks such as [`Normalize`] and [`Filter`] are configured once and
//! applied in place, chained through a [`Pipeline`].

pub mod block;
pub mod dsp;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod state;

pub use block::{Pipeline, ProcessingBlock};
pub use error::{Error, Result};
pub use filter::{Filter, FilterConfig, FilterType, FrequencySpec};
pub use normalize::{AmpNormType, AxisSelection, Normalize, NormalizeConfig};
pub use state::{SampleArray, StateContainer, TRACE_SAMPLING_RATE_HZ};
