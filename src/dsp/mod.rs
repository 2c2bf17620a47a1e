//! Numeric backend: axis reductions, detrending, and digital filtering.
//!
//! The processing blocks consume these through plain functional interfaces
//! so their step ordering, axis semantics, and zero-guards can be tested
//! against this module as the reference implementation.

pub mod butter;
pub mod sos;
pub mod stats;

pub use butter::design;
pub use sos::{filter_along_last_axis, Biquad, Sos};
