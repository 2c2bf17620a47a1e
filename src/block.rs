//! Processing block contract and block sequencing.

use crate::error::Result;
use crate::state::StateContainer;

/// A single configured, reusable transform step.
///
/// Configuration is frozen at construction and validated there; `apply`
/// mutates the container in place and signals failure through the returned
/// `Result`. Blocks carry no mutable state of their own, so one block may be
/// applied repeatedly to independent containers, including from many threads
/// in parallel. A container must be owned exclusively by one apply call for
/// its duration.
pub trait ProcessingBlock: Send + Sync {
    fn apply(&self, state: &mut StateContainer) -> Result<()>;
}

/// An ordered sequence of blocks applied to one container.
///
/// Blocks run in insertion order; the first error aborts processing of the
/// item and is returned verbatim. Retry or skip policy belongs to the caller.
#[derive(Default)]
pub struct Pipeline {
    blocks: Vec<Box<dyn ProcessingBlock>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: impl ProcessingBlock + 'static) {
        self.blocks.push(Box::new(block));
    }

    pub fn with_block(mut self, block: impl ProcessingBlock + 'static) -> Self {
        self.push(block);
        self
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn apply(&self, state: &mut StateContainer) -> Result<()> {
        for block in &self.blocks {
            block.apply(state)?;
        }
        Ok(())
    }
}

impl ProcessingBlock for Pipeline {
    fn apply(&self, state: &mut StateContainer) -> Result<()> {
        Pipeline::apply(self, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::array;

    struct AddOne;

    impl ProcessingBlock for AddOne {
        fn apply(&self, state: &mut StateContainer) -> Result<()> {
            let data = state.entry_as_float_mut("X")?;
            data.mapv_inplace(|v| v + 1.0);
            Ok(())
        }
    }

    #[test]
    fn test_blocks_run_in_order() {
        let pipeline = Pipeline::new().with_block(AddOne).with_block(AddOne);
        assert_eq!(pipeline.len(), 2);

        let mut state = StateContainer::new();
        state.insert("X", array![0.0, 1.0]);
        pipeline.apply(&mut state).unwrap();

        let data = state.get("X").unwrap().as_float().unwrap();
        assert_eq!(data.as_slice().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_first_error_aborts() {
        let pipeline = Pipeline::new().with_block(AddOne);
        let mut state = StateContainer::new();
        let err = pipeline.apply(&mut state).unwrap_err();
        assert!(matches!(err, Error::MissingKey(_)));
    }
}
