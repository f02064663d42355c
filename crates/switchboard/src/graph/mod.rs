// Task Graph Module
//
// This module provides the task graph and its rewrites:
// - Task and outcome types
// - First-writer-wins merging of proposed tasks
// - Same-agent chain compaction
// - ASCII rendering for logs

mod merge;
mod optimize;
mod render;
pub(crate) mod state;
mod types;

#[cfg(test)]
mod graph_property_tests;

pub use merge::*;
pub use optimize::*;
pub use render::*;
pub use types::*;
