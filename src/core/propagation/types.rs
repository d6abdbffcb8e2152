// File: src/core/propagation/types.rs
use std::collections::HashMap;
use std::fmt;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::types::VariableType;

/// Per-variable load state.
///
/// `Pending` means the variable is not yet eligible to run, `Loading` means a
/// fetch is in flight with nothing merged yet, `PartiallyLoaded` means a
/// usable value exists while the fetch is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    Pending,
    Loading,
    PartiallyLoaded,
    Resolved,
}

impl LoadState {
    pub fn can_transition_to(self, next: LoadState) -> bool {
        use LoadState::*;
        match (self, next) {
            // Any state may be reset
            (_, Pending) => true,
            (Pending, Loading) | (Resolved, Loading) => true,
            (Loading, PartiallyLoaded) | (PartiallyLoaded, PartiallyLoaded) => true,
            (Pending, Resolved)
            | (Loading, Resolved)
            | (PartiallyLoaded, Resolved)
            | (Resolved, Resolved) => true,
            _ => false,
        }
    }

    pub fn is_loading(self) -> bool {
        matches!(self, LoadState::Loading | LoadState::PartiallyLoaded)
    }

    pub fn is_loading_pending(self) -> bool {
        matches!(self, LoadState::Idle | LoadState::Pending | LoadState::Loading)
    }

    pub fn is_partially_loaded(self) -> bool {
        matches!(self, LoadState::PartiallyLoaded | LoadState::Resolved)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::Idle => "idle",
            LoadState::Pending => "pending",
            LoadState::Loading => "loading",
            LoadState::PartiallyLoaded => "partially_loaded",
            LoadState::Resolved => "resolved",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct VariableNode {
    pub name: String,
    pub variable_type: VariableType,
}

/// Parent/child relations among variables. An edge `a -> b` means `b`
/// references `$a` in its filters.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub graph: DiGraph<VariableNode, ()>,
    pub node_indices: HashMap<String, NodeIndex>,
    pub(crate) names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEntry {
    pub parent_variables: Vec<String>,
    pub child_variables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationResult {
    pub changed_variable: String,
    pub reset_variables: Vec<String>,
    pub cancelled_fetches: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropagationError {
    #[error("Cyclic dependency between variables: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Variable '{0}' is a constant and cannot be changed")]
    ConstantVariable(String),

    #[error("Variable '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: LoadState,
        to: LoadState,
    },

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(LoadState::Idle.can_transition_to(LoadState::Pending));
        assert!(LoadState::Resolved.can_transition_to(LoadState::Pending));
        assert!(LoadState::Loading.can_transition_to(LoadState::PartiallyLoaded));
        assert!(LoadState::Pending.can_transition_to(LoadState::Resolved));

        assert!(!LoadState::Idle.can_transition_to(LoadState::Loading));
        assert!(!LoadState::Idle.can_transition_to(LoadState::Resolved));
        assert!(!LoadState::Pending.can_transition_to(LoadState::PartiallyLoaded));
        assert!(!LoadState::Resolved.can_transition_to(LoadState::PartiallyLoaded));
    }

    #[test]
    fn test_derived_flags() {
        assert!(LoadState::PartiallyLoaded.is_loading());
        assert!(!LoadState::PartiallyLoaded.is_loading_pending());
        assert!(LoadState::Loading.is_loading_pending());
        assert!(LoadState::Resolved.is_partially_loaded());
        assert!(!LoadState::Resolved.is_loading());
    }

    #[test]
    fn test_cycle_message() {
        let err = PropagationError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Cyclic dependency between variables: a -> b -> a");
    }
}
