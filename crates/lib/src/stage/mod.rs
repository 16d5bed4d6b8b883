//! Build stages.
//!
//! A stage is a named phase producing one filesystem layer. Stages are
//! plain data: an ordered instruction list and the stage they derive from.
//! They are content-hashed, so an unchanged stage maps to an unchanged store
//! entry.
//!
//! # Submodules
//!
//! - [`graph`] - Parent/child relation, lineage and build waves
//! - [`state`] - Build-time state machine

pub mod graph;
pub mod state;
mod types;

pub use graph::StageGraph;
pub use state::{BuildEvent, BuildState};
pub use types::*;
