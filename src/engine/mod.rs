//! Generation orchestration and the inference backend boundary.

pub mod backend;
pub mod orchestrator;

pub use backend::{GenerationBackend, PlaceholderBackend};
pub use orchestrator::GenerationEngine;
