#![forbid(unsafe_code)]

//! Mutable view of a received basic block.
//!
//! The optimizer edits a [`BlockModel`] freely; afterwards [`BlockModel::patch_set`] turns the
//! result back into entries that only reference the block's original instructions by index.

pub mod block;
pub mod branch;
pub mod opt;

#[cfg(test)]
mod proptests;

pub use block::{BlockError, BlockModel, Node, NodeId, Result};
pub use opt::{LoopUnroll, Optimizer, Passthrough};
