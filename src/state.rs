//! State container threaded through a chain of processing blocks.
//!
//! Each item in a pipeline is represented as a bundle of named sample arrays
//! plus a metadata map. Blocks borrow the container mutably for the duration
//! of one apply call and mutate the entries in place.

use std::collections::HashMap;

use ndarray::{Array, ArrayD, Dimension};
use serde_json::Value;

use crate::error::{Error, Result};

/// Metadata field holding the sampling rate of the waveform traces
pub const TRACE_SAMPLING_RATE_HZ: &str = "trace_sampling_rate_hz";

/// A named sample array, tagged by element type.
///
/// Normalization and filtering produce fractional values, so integer-typed
/// input is upcast to a fresh floating-point buffer before any in-place
/// modification. After a block has run, the entry it operated on is always
/// `Float`.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArray {
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
}

impl SampleArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            SampleArray::Int(a) => a.shape(),
            SampleArray::Float(a) => a.shape(),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleArray::Float(_))
    }

    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match self {
            SampleArray::Float(a) => Some(a),
            SampleArray::Int(_) => None,
        }
    }

    /// Convert into a floating-point array, upcasting integer samples.
    pub fn into_float(self) -> ArrayD<f64> {
        match self {
            SampleArray::Float(a) => a,
            SampleArray::Int(a) => a.mapv(|v| v as f64),
        }
    }
}

impl<D: Dimension> From<Array<f64, D>> for SampleArray {
    fn from(array: Array<f64, D>) -> Self {
        SampleArray::Float(array.into_dyn())
    }
}

impl<D: Dimension> From<Array<i64, D>> for SampleArray {
    fn from(array: Array<i64, D>) -> Self {
        SampleArray::Int(array.into_dyn())
    }
}

/// Mutable per-item bundle of named sample arrays and metadata.
///
/// Created by the caller, passed by mutable reference through a chain of
/// blocks. No block assumes the existence of keys beyond the ones it is
/// configured for and the metadata fields it declares a dependency on.
#[derive(Debug, Clone, Default)]
pub struct StateContainer {
    entries: HashMap<String, SampleArray>,
    metadata: HashMap<String, Value>,
}

impl StateContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, array: impl Into<SampleArray>) {
        self.entries.insert(key.into(), array.into());
    }

    pub fn get(&self, key: &str) -> Option<&SampleArray> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut SampleArray> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<SampleArray> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Borrow the entry under `key` as a floating-point array, upcasting an
    /// integer entry first. The upcast allocates a new buffer that replaces
    /// the entry; the integer buffer is never mutated with fractional values.
    pub fn entry_as_float_mut(&mut self, key: &str) -> Result<&mut ArrayD<f64>> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::MissingKey(key.to_owned()))?;

        if let SampleArray::Int(ints) = entry {
            let upcast = ints.mapv(|v| v as f64);
            *entry = SampleArray::Float(upcast);
        }

        match entry {
            SampleArray::Float(a) => Ok(a),
            SampleArray::Int(_) => Err(Error::InvalidParameter(format!(
                "entry '{key}' could not be upcast to a floating-point array"
            ))),
        }
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Read the trace sampling rate from the metadata map.
    pub fn sampling_rate_hz(&self) -> Result<f64> {
        self.metadata
            .get(TRACE_SAMPLING_RATE_HZ)
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::MissingMetadata(TRACE_SAMPLING_RATE_HZ.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_insert_and_get() {
        let mut state = StateContainer::new();
        state.insert("X", array![[1.0, 2.0], [3.0, 4.0]]);

        assert!(state.contains("X"));
        assert_eq!(state.get("X").map(|a| a.shape()), Some(&[2, 2][..]));
        assert!(state.get("Y").is_none());
    }

    #[test]
    fn test_missing_key_error() {
        let mut state = StateContainer::new();
        let err = state.entry_as_float_mut("X").unwrap_err();
        assert!(matches!(err, Error::MissingKey(k) if k == "X"));
    }

    #[test]
    fn test_integer_entry_is_upcast_in_place() {
        let mut state = StateContainer::new();
        state.insert("X", array![1i64, 2, 3]);
        assert!(!state.get("X").unwrap().is_float());

        let floats = state.entry_as_float_mut("X").unwrap();
        assert_eq!(floats.as_slice().unwrap(), &[1.0, 2.0, 3.0]);
        // The entry itself was replaced, not just a view converted.
        assert!(state.get("X").unwrap().is_float());
    }

    #[test]
    fn test_sampling_rate_from_metadata() {
        let mut state = StateContainer::new();
        assert!(matches!(
            state.sampling_rate_hz(),
            Err(Error::MissingMetadata(_))
        ));

        state.set_metadata(TRACE_SAMPLING_RATE_HZ, 20.0);
        assert_eq!(state.sampling_rate_hz().unwrap(), 20.0);

        state.set_metadata(TRACE_SAMPLING_RATE_HZ, "not a number");
        assert!(matches!(
            state.sampling_rate_hz(),
            Err(Error::MissingMetadata(_))
        ));
    }
}
