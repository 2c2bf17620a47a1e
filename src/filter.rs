//! Frequency filtering block driven by sample-rate metadata.

use serde::{Deserialize, Serialize};

use crate::block::ProcessingBlock;
use crate::dsp::{butter, sos};
use crate::error::{Error, Result};
use crate::state::StateContainer;

/// Filter response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

impl FilterType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lowpass" => Some(Self::Lowpass),
            "highpass" => Some(Self::Highpass),
            "bandpass" => Some(Self::Bandpass),
            "bandstop" => Some(Self::Bandstop),
            _ => None,
        }
    }

    /// Parse a filter type name, rejecting anything outside the closed set.
    pub fn parse(value: &str) -> Result<Self> {
        Self::from_str(value).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "unknown filter type '{value}' (expected \"lowpass\", \"highpass\", \
                 \"bandpass\" or \"bandstop\")"
            ))
        })
    }
}

/// Critical frequency: a single cutoff for lowpass/highpass, a (low, high)
/// pair for bandpass/bandstop. Values are in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencySpec {
    Single(f64),
    Band(f64, f64),
}

impl From<f64> for FrequencySpec {
    fn from(f: f64) -> Self {
        FrequencySpec::Single(f)
    }
}

impl From<(f64, f64)> for FrequencySpec {
    fn from(band: (f64, f64)) -> Self {
        FrequencySpec::Band(band.0, band.1)
    }
}

/// Configuration for the [`Filter`] block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Butterworth filter order.
    pub order: usize,
    pub frequency: FrequencySpec,
    pub filter_type: FilterType,
    /// Apply forward then backward (zero-phase) instead of a single causal
    /// pass. Doubles the effective order and removes phase distortion.
    #[serde(default)]
    pub forward_backward: bool,
    /// Data entry to filter.
    #[serde(default = "default_key")]
    pub key: String,
}

fn default_key() -> String {
    "X".to_owned()
}

impl FilterConfig {
    pub fn new(order: usize, frequency: impl Into<FrequencySpec>, filter_type: FilterType) -> Self {
        Self {
            order,
            frequency: frequency.into(),
            filter_type,
            forward_backward: false,
            key: default_key(),
        }
    }
}

/// Butterworth filtering of one data entry along its last (time) axis.
///
/// The sampling rate is read from the container's metadata at apply time;
/// the designed filter is applied per channel with a fresh state, causally
/// or zero-phase depending on `forward_backward`.
#[derive(Debug, Clone)]
pub struct Filter {
    config: FilterConfig,
}

impl Filter {
    pub fn new(config: FilterConfig) -> Result<Self> {
        if config.order == 0 {
            return Err(Error::InvalidParameter(
                "filter order must be positive".to_owned(),
            ));
        }
        match (config.filter_type, config.frequency) {
            (FilterType::Lowpass | FilterType::Highpass, FrequencySpec::Band(..)) => {
                return Err(Error::InvalidParameter(format!(
                    "{:?} filters take a single critical frequency, not a band",
                    config.filter_type
                )));
            }
            (FilterType::Bandpass | FilterType::Bandstop, FrequencySpec::Single(..)) => {
                return Err(Error::InvalidParameter(format!(
                    "{:?} filters take a (low, high) frequency pair",
                    config.filter_type
                )));
            }
            (_, FrequencySpec::Single(f)) if f <= 0.0 => {
                return Err(Error::InvalidParameter(format!(
                    "critical frequency must be positive, got {f} Hz"
                )));
            }
            (_, FrequencySpec::Band(low, high)) if low <= 0.0 || low >= high => {
                return Err(Error::InvalidParameter(format!(
                    "frequency band must satisfy 0 < low < high, got ({low}, {high}) Hz"
                )));
            }
            _ => {}
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

impl ProcessingBlock for Filter {
    fn apply(&self, state: &mut StateContainer) -> Result<()> {
        let sampling_rate = state.sampling_rate_hz()?;
        let config = &self.config;

        let sos = butter::design(
            config.order,
            &config.frequency,
            config.filter_type,
            sampling_rate,
        )?;
        log::debug!(
            "filtering entry '{}': {:?} of order {}, {} sections, fs {} Hz, zero_phase={}",
            config.key,
            config.filter_type,
            config.order,
            sos.len(),
            sampling_rate,
            config.forward_backward
        );

        let data = state.entry_as_float_mut(&config.key)?;
        sos::filter_along_last_axis(&sos, data, config.forward_backward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_type_names() {
        assert_eq!(FilterType::from_str("lowpass"), Some(FilterType::Lowpass));
        assert_eq!(FilterType::from_str("bandstop"), Some(FilterType::Bandstop));
        assert_eq!(FilterType::from_str("notch"), None);
        assert!(matches!(
            FilterType::parse("notch"),
            Err(Error::InvalidParameter(msg)) if msg.contains("notch")
        ));
    }

    #[test]
    fn test_construction_validation() {
        assert!(Filter::new(FilterConfig::new(0, 1.0, FilterType::Lowpass)).is_err());
        assert!(Filter::new(FilterConfig::new(2, -1.0, FilterType::Lowpass)).is_err());
        assert!(Filter::new(FilterConfig::new(2, (0.5, 2.0), FilterType::Lowpass)).is_err());
        assert!(Filter::new(FilterConfig::new(2, 1.0, FilterType::Bandpass)).is_err());
        assert!(Filter::new(FilterConfig::new(2, (2.0, 0.5), FilterType::Bandpass)).is_err());
        assert!(Filter::new(FilterConfig::new(2, (0.0, 2.0), FilterType::Bandpass)).is_err());

        assert!(Filter::new(FilterConfig::new(2, 1.0, FilterType::Lowpass)).is_ok());
        assert!(Filter::new(FilterConfig::new(1, (0.5, 2.0), FilterType::Bandpass)).is_ok());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let mut config = FilterConfig::new(1, (0.5, 2.0), FilterType::Bandpass);
        config.forward_backward = true;

        let json = serde_json::to_string(&config).unwrap();
        let back: FilterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_missing_sampling_rate_is_reported() {
        let block = Filter::new(FilterConfig::new(2, 1.0, FilterType::Lowpass)).unwrap();
        let mut state = StateContainer::new();
        state.insert("X", ndarray::Array2::<f64>::zeros((3, 100)));

        assert!(matches!(
            block.apply(&mut state),
            Err(Error::MissingMetadata(_))
        ));
    }
}
