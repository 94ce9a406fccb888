//! Optimizer passes run on each received block.
//!
//! A pass may only reorder, clone, drop and edit nodes of the block; it has no way to create an
//! instruction from nothing, which is what keeps every result expressible as patches.

mod loop_unroll;

pub use loop_unroll::LoopUnroll;

use crate::block::{BlockModel, Result};

pub trait Optimizer {
    fn optimize(&mut self, block: &mut BlockModel) -> Result<()>;
}

impl<F> Optimizer for F
where
    F: FnMut(&mut BlockModel) -> Result<()>,
{
    fn optimize(&mut self, block: &mut BlockModel) -> Result<()> {
        self(block)
    }
}

/// Leaves every block as it arrived.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Optimizer for Passthrough {
    fn optimize(&mut self, _block: &mut BlockModel) -> Result<()> {
        Ok(())
    }
}
