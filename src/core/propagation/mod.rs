mod types;
mod graph;
mod schedule;
mod engine;

pub use types::*;
pub use graph::referenced_parents;
pub use schedule::{schedule, LoadOrder};
pub use engine::{ChangePropagationEngine, EngineContext};
