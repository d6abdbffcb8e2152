// File: src/core/store.rs
use std::collections::HashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::core::propagation::{LoadState, PropagationError};
use crate::core::types::{Scope, VariableDefinition, VariableOption, VariableType, VariableValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableRecord {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    #[serde(rename = "multiSelect")]
    pub multi_select: bool,
    pub scope: Scope,
    pub tabs: Vec<String>,
    pub panels: Vec<String>,
    pub value: VariableValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<VariableOption>,
    pub state: LoadState,
}

impl VariableRecord {
    pub fn from_definition(def: &VariableDefinition) -> Self {
        Self {
            name: def.name.clone(),
            label: def.display_label().to_string(),
            variable_type: def.variable_type(),
            multi_select: def.multi_select,
            scope: def.scope,
            tabs: def.tabs.clone(),
            panels: def.panels.clone(),
            value: def.empty_value(),
            options: Vec::new(),
            state: LoadState::Idle,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn is_variable_loading_pending(&self) -> bool {
        self.state.is_loading_pending()
    }

    pub fn is_variable_partial_loaded(&self) -> bool {
        self.state.is_partially_loaded()
    }

    fn without_options(&self) -> Self {
        Self { options: Vec::new(), ..self.clone() }
    }
}

/// What consumers receive on every settled change. Options are stripped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariablesSnapshot {
    #[serde(rename = "isVariablesLoading")]
    pub is_variables_loading: bool,
    pub values: Vec<VariableRecord>,
}

impl VariablesSnapshot {
    pub fn get(&self, name: &str) -> Option<&VariableRecord> {
        self.values.iter().find(|r| r.name == name)
    }
}

/// Owns every variable record and the old-value snapshot. All mutation goes
/// through the methods below so state transitions stay guarded.
#[derive(Debug)]
pub struct VariableStore {
    records: Vec<VariableRecord>,
    empty_values: HashMap<String, VariableValue>,
    indices: HashMap<String, usize>,
    old_values: HashMap<String, VariableValue>,
    sender: watch::Sender<VariablesSnapshot>,
}

impl VariableStore {
    pub fn new(definitions: &[VariableDefinition]) -> Self {
        let (sender, _) = watch::channel(VariablesSnapshot::default());
        let mut store = Self {
            records: Vec::new(),
            empty_values: HashMap::new(),
            indices: HashMap::new(),
            old_values: HashMap::new(),
            sender,
        };
        store.rebuild(definitions);
        store
    }

    /// Replaces all records. Old values survive for names still defined.
    pub fn rebuild(&mut self, definitions: &[VariableDefinition]) {
        self.records.clear();
        self.indices.clear();
        self.empty_values.clear();

        for def in definitions {
            if self.indices.contains_key(&def.name) {
                continue;
            }
            self.indices.insert(def.name.clone(), self.records.len());
            self.empty_values.insert(def.name.clone(), def.empty_value());
            self.records.push(VariableRecord::from_definition(def));
        }

        let indices = &self.indices;
        self.old_values.retain(|name, _| indices.contains_key(name));
    }

    pub fn subscribe(&self) -> watch::Receiver<VariablesSnapshot> {
        self.sender.subscribe()
    }

    pub fn records(&self) -> &[VariableRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&VariableRecord> {
        self.indices.get(name).map(|&i| &self.records[i])
    }

    pub fn state(&self, name: &str) -> Option<LoadState> {
        self.get(name).map(|r| r.state)
    }

    pub fn value(&self, name: &str) -> Option<&VariableValue> {
        self.get(name).map(|r| &r.value)
    }

    pub fn is_variables_loading(&self) -> bool {
        self.records.iter().any(|r| r.is_loading() || r.state == LoadState::Pending)
    }

    pub fn snapshot(&self) -> VariablesSnapshot {
        VariablesSnapshot {
            is_variables_loading: self.is_variables_loading(),
            values: self.records.iter().map(|r| r.without_options()).collect(),
        }
    }

    /// Publishes a snapshot to subscribers when it differs from the last one.
    pub fn emit(&self) {
        let snapshot = self.snapshot();
        self.sender.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    pub fn old_value(&self, name: &str) -> Option<&VariableValue> {
        self.old_values.get(name)
    }

    pub fn seed_old_value(&mut self, name: &str, value: VariableValue) {
        if self.indices.contains_key(name) {
            self.old_values.insert(name.to_string(), value);
        }
    }

    pub fn forget_old_value(&mut self, name: &str) {
        self.old_values.remove(name);
    }

    fn record_mut(&mut self, name: &str) -> Result<&mut VariableRecord, PropagationError> {
        match self.indices.get(name) {
            Some(&i) => Ok(&mut self.records[i]),
            None => Err(PropagationError::VariableNotFound(name.to_string())),
        }
    }

    fn transition(&mut self, name: &str, next: LoadState) -> Result<&mut VariableRecord, PropagationError> {
        let record = self.record_mut(name)?;
        if !record.state.can_transition_to(next) {
            return Err(PropagationError::InvalidTransition {
                name: name.to_string(),
                from: record.state,
                to: next,
            });
        }
        record.state = next;
        Ok(record)
    }

    fn empty_value(&self, name: &str) -> VariableValue {
        self.empty_values.get(name).cloned().unwrap_or(VariableValue::Null)
    }

    fn remember(&mut self, name: &str, value: &VariableValue) {
        if value.is_empty() {
            return;
        }
        if self.old_values.get(name) != Some(value) {
            self.old_values.insert(name.to_string(), value.clone());
        }
    }

    /// Clears value and options and marks the variable pending.
    pub fn reset(&mut self, name: &str) -> Result<(), PropagationError> {
        let empty = self.empty_value(name);
        let record = self.transition(name, LoadState::Pending)?;
        record.value = empty;
        record.options.clear();
        Ok(())
    }

    /// Reset of a dependent whose ancestor changed: its old value is dropped too.
    pub fn reset_descendant(&mut self, name: &str) -> Result<(), PropagationError> {
        self.reset(name)?;
        self.forget_old_value(name);
        Ok(())
    }

    pub fn begin_loading(&mut self, name: &str) -> Result<(), PropagationError> {
        self.transition(name, LoadState::Loading)?;
        Ok(())
    }

    /// A value known before any batch arrives, e.g. the select-all sentinel.
    pub fn apply_preset(&mut self, name: &str, value: VariableValue) -> Result<(), PropagationError> {
        let record = self.transition(name, LoadState::PartiallyLoaded)?;
        record.value = value;
        Ok(())
    }

    /// Merges one batch of options and applies the selection made against them.
    pub fn merge_batch(
        &mut self,
        name: &str,
        options: Vec<VariableOption>,
        value: VariableValue,
    ) -> Result<(), PropagationError> {
        let record = self.transition(name, LoadState::PartiallyLoaded)?;
        for option in options {
            if !record.options.iter().any(|o| o.value == option.value) {
                record.options.push(option);
            }
        }
        record.value = value;
        Ok(())
    }

    /// Replaces options without touching the selected value (search results).
    pub fn replace_options(&mut self, name: &str, options: Vec<VariableOption>) -> Result<(), PropagationError> {
        let record = self.record_mut(name)?;
        record.options = options;
        Ok(())
    }

    pub fn extend_options(&mut self, name: &str, options: Vec<VariableOption>) -> Result<(), PropagationError> {
        let record = self.record_mut(name)?;
        for option in options {
            if !record.options.iter().any(|o| o.value == option.value) {
                record.options.push(option);
            }
        }
        Ok(())
    }

    /// Successful resolution. `options` of `None` keeps the current list.
    pub fn resolve(
        &mut self,
        name: &str,
        value: VariableValue,
        options: Option<Vec<VariableOption>>,
    ) -> Result<(), PropagationError> {
        let record = self.transition(name, LoadState::Resolved)?;
        record.value = value.clone();
        if let Some(options) = options {
            record.options = options;
        }
        self.remember(name, &value);
        Ok(())
    }

    /// Resolution without data: upstream empty or fetch failure.
    pub fn resolve_empty(&mut self, name: &str) -> Result<(), PropagationError> {
        let empty = self.empty_value(name);
        let record = self.transition(name, LoadState::Resolved)?;
        record.value = empty;
        record.options.clear();
        Ok(())
    }

    /// A user or system selection.
    pub fn apply_value(&mut self, name: &str, value: VariableValue) -> Result<(), PropagationError> {
        let record = self.transition(name, LoadState::Resolved)?;
        record.value = value.clone();
        self.remember(name, &value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::*;

    fn custom(name: &str, multi: bool) -> VariableDefinition {
        VariableDefinition {
            name: name.to_string(),
            label: Some(format!("{} label", name)),
            kind: VariableKind::Custom { options: vec![] },
            multi_select: multi,
            select_all: SelectAllPolicy::None,
            custom_multi_select_value: vec![],
            scope: Scope::Global,
            tabs: vec![],
            panels: vec![],
        }
    }

    #[test]
    fn test_guarded_transitions() {
        let mut store = VariableStore::new(&[custom("env", false)]);
        assert_eq!(store.state("env"), Some(LoadState::Idle));

        let err = store.apply_value("env", VariableValue::Str("prod".into())).unwrap_err();
        assert!(matches!(err, PropagationError::InvalidTransition { .. }));

        store.reset("env").unwrap();
        store.apply_value("env", VariableValue::Str("prod".into())).unwrap();
        assert_eq!(store.old_value("env"), Some(&VariableValue::Str("prod".into())));
    }

    #[test]
    fn test_descendant_reset_forgets_old_value() {
        let mut store = VariableStore::new(&[custom("host", true)]);
        store.seed_old_value("host", VariableValue::List(vec!["a".into()]));
        store.reset("host").unwrap();
        assert!(store.old_value("host").is_some());

        store.reset_descendant("host").unwrap();
        assert!(store.old_value("host").is_none());
        assert_eq!(store.value("host"), Some(&VariableValue::List(vec![])));
    }

    #[test]
    fn test_merge_batch_dedupes_options() {
        let mut store = VariableStore::new(&[custom("host", false)]);
        store.reset("host").unwrap();
        store.begin_loading("host").unwrap();
        store.merge_batch("host", vec![VariableOption::new("a", "a")], VariableValue::Str("a".into())).unwrap();
        store.merge_batch(
            "host",
            vec![VariableOption::new("a", "a"), VariableOption::new("b", "b")],
            VariableValue::Str("a".into()),
        ).unwrap();

        let record = store.get("host").unwrap();
        assert_eq!(record.options.len(), 2);
        assert!(record.is_variable_partial_loaded());
        assert!(record.is_loading());
    }

    #[test]
    fn test_snapshot_strips_options_and_notifies() {
        let mut store = VariableStore::new(&[custom("env", false)]);
        let mut rx = store.subscribe();

        store.reset("env").unwrap();
        store.resolve("env", VariableValue::Str("a".into()), Some(vec![VariableOption::new("a", "a")])).unwrap();
        store.emit();

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(!snapshot.is_variables_loading);
        assert!(snapshot.get("env").unwrap().options.is_empty());
        assert_eq!(store.get("env").unwrap().options.len(), 1);

        store.emit();
        assert!(!rx.has_changed().unwrap());
    }
}
