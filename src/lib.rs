//! Dependency resolution and value loading for dashboard variables.
//!
//! Variables reference each other as `$name` inside query filters. The
//! [`ChangePropagationEngine`] orders them, fetches option lists through a
//! [`FieldValuesService`], and re-resolves dependents whenever a value changes.

pub mod core;

pub use crate::core::config::{EngineConfig, FetchMode};
pub use crate::core::fixture::FixtureService;
pub use crate::core::history::{EventKind, HistoryEntry, HistoryManager};
pub use crate::core::initial::InitialValues;
pub use crate::core::propagation::{
    ChangePropagationEngine, DependencyGraph, EngineContext, LoadOrder, LoadState, PropagationError,
    PropagationResult,
};
pub use crate::core::scope::ScopeContext;
pub use crate::core::service::{
    FetchError, FieldValue, FieldValuesRequest, FieldValuesResponse, FieldValuesService, StreamEvent,
};
pub use crate::core::store::{VariableRecord, VariablesSnapshot};
pub use crate::core::types::*;
