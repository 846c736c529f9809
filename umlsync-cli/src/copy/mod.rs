//! Subtree copy with optional generalization materialization

mod engine;
mod hierarchy;

pub use engine::{CopiedGraph, CopyOptions, CopyOutcome, CopyStats, GraphCopier, copy_package, plan_copy};
pub use hierarchy::Hierarchy;
