//! Amplitude normalization block: demeaning, detrending, peak/std scaling.

use serde::{Deserialize, Serialize};

use crate::block::ProcessingBlock;
use crate::dsp::stats;
use crate::error::{Error, Result};
use crate::state::StateContainer;

/// Amplitude normalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmpNormType {
    /// Divide by the maximum absolute value of the reduction.
    #[default]
    Peak,
    /// Divide by the population standard deviation of the reduction.
    Std,
}

impl AmpNormType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "peak" => Some(Self::Peak),
            "std" => Some(Self::Std),
            _ => None,
        }
    }

    /// Parse a mode name, rejecting anything outside the closed set.
    pub fn parse(value: &str) -> Result<Self> {
        Self::from_str(value).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "unknown amplitude normalization type '{value}' (expected \"peak\" or \"std\")"
            ))
        })
    }
}

/// One or more axes to reduce over.
///
/// `Single` collapses one axis, computing the reduction independently for
/// every index along the remaining axes. `Multiple` reduces jointly over all
/// listed axes as one combined reduction. Negative indices count from the
/// last axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisSelection {
    Single(isize),
    Multiple(Vec<isize>),
}

impl AxisSelection {
    fn raw(&self) -> &[isize] {
        match self {
            AxisSelection::Single(axis) => std::slice::from_ref(axis),
            AxisSelection::Multiple(axes) => axes,
        }
    }

    /// Construction-time validation; ndim is only known at apply time.
    fn validate(&self) -> Result<()> {
        if self.raw().is_empty() {
            return Err(Error::InvalidParameter(
                "axis selection must name at least one axis".to_owned(),
            ));
        }
        Ok(())
    }

    pub(crate) fn resolve(&self, ndim: usize) -> Result<Vec<usize>> {
        let mut axes = self
            .raw()
            .iter()
            .map(|&axis| stats::resolve_axis(axis, ndim))
            .collect::<Result<Vec<_>>>()?;
        axes.sort_unstable();
        axes.dedup();
        Ok(axes)
    }
}

impl From<isize> for AxisSelection {
    fn from(axis: isize) -> Self {
        AxisSelection::Single(axis)
    }
}

impl From<(isize, isize)> for AxisSelection {
    fn from(axes: (isize, isize)) -> Self {
        AxisSelection::Multiple(vec![axes.0, axes.1])
    }
}

impl From<Vec<isize>> for AxisSelection {
    fn from(axes: Vec<isize>) -> Self {
        AxisSelection::Multiple(axes)
    }
}

/// Configuration for the [`Normalize`] block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Data entry to transform.
    #[serde(default = "default_key")]
    pub key: String,
    /// Axis or axes to demean over; `None` skips demeaning.
    #[serde(default)]
    pub demean_axis: Option<AxisSelection>,
    /// Axis to remove the linear trend along; `None` skips detrending.
    #[serde(default)]
    pub detrend_axis: Option<isize>,
    /// Axis or axes to amplitude-normalize over; `None` skips normalization.
    #[serde(default)]
    pub amp_norm_axis: Option<AxisSelection>,
    #[serde(default)]
    pub amp_norm_type: AmpNormType,
}

fn default_key() -> String {
    "X".to_owned()
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            demean_axis: None,
            detrend_axis: None,
            amp_norm_axis: None,
            amp_norm_type: AmpNormType::default(),
        }
    }
}

/// Demeaning, detrending, and amplitude normalization of one data entry.
///
/// Steps run in a fixed order, each skipped when its axis is unset:
/// integer upcast, detrend, demean, amplitude normalization. A reduction
/// that is exactly zero (an all-zero slice) is treated as 1 so degenerate
/// slices pass through unchanged instead of turning into NaN.
#[derive(Debug, Clone)]
pub struct Normalize {
    config: NormalizeConfig,
}

impl Normalize {
    pub fn new(config: NormalizeConfig) -> Result<Self> {
        if let Some(selection) = &config.demean_axis {
            selection.validate()?;
        }
        if let Some(selection) = &config.amp_norm_axis {
            selection.validate()?;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }
}

impl ProcessingBlock for Normalize {
    fn apply(&self, state: &mut StateContainer) -> Result<()> {
        let config = &self.config;
        let data = state.entry_as_float_mut(&config.key)?;
        log::debug!(
            "normalizing entry '{}' with shape {:?}",
            config.key,
            data.shape()
        );

        if let Some(axis) = config.detrend_axis {
            let axis = stats::resolve_axis(axis, data.ndim())?;
            stats::detrend_linear(data, axis);
        }

        if let Some(selection) = &config.demean_axis {
            let axes = selection.resolve(data.ndim())?;
            let mean = stats::mean_keepdims(data, &axes);
            *data -= &mean;
        }

        if let Some(selection) = &config.amp_norm_axis {
            let axes = selection.resolve(data.ndim())?;
            let reduction = match config.amp_norm_type {
                AmpNormType::Peak => stats::max_abs_keepdims(data, &axes),
                AmpNormType::Std => stats::std_keepdims(data, &axes),
            };
            // An all-zero slice reduces to exactly 0; dividing by it would
            // inject NaN into data that should stay zero.
            let divisor = reduction.mapv_into(|v| if v == 0.0 { 1.0 } else { v });
            *data /= &divisor;
        }

        Ok(())
    }
}
