// File: src/core/propagation/engine.rs
use std::collections::HashMap;
use std::sync::Arc;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::schedule::{schedule, LoadOrder};
use super::types::*;
use crate::core::cancellation::{CancellationRegistry, CancelledFetch, FetchTicket};
use crate::core::config::{EngineConfig, FetchMode};
use crate::core::history::{EventKind, HistoryManager};
use crate::core::initial::InitialValues;
use crate::core::resolver::{
    build_request, coerce_value, options_from_responses, preset_value, resolve_static, select_value,
};
use crate::core::scope::{visible_for_consumption, visible_for_render, ScopeContext};
use crate::core::service::{FetchError, FieldValuesRequest, FieldValuesResponse, FieldValuesService, StreamEvent};
use crate::core::store::{VariableRecord, VariableStore, VariablesSnapshot};
use crate::core::types::{TimeRange, VariableDefinition, VariableType, VariableValue};
use crate::core::validator::{validate_definitions, ValidationReport};

/// Collaborators the engine is constructed with.
#[derive(Clone)]
pub struct EngineContext {
    pub service: Arc<dyn FieldValuesService>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(service: Arc<dyn FieldValuesService>, config: EngineConfig) -> Self {
        Self { service, config }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPurpose {
    Load,
    Search,
}

#[derive(Debug)]
enum FetchEvent {
    Response(Vec<FieldValuesResponse>),
    Batch(Vec<FieldValuesResponse>),
    Complete,
    Failed(FetchError),
}

#[derive(Debug)]
struct FetchMessage {
    name: String,
    generation: u64,
    purpose: FetchPurpose,
    event: FetchEvent,
}

enum Readiness {
    Wait,
    Ready,
    NoUpstreamData(String),
}

struct Compiled {
    graph: DependencyGraph,
    order: LoadOrder,
    configuration_error: Option<PropagationError>,
    validation: ValidationReport,
}

/// Drives resolution of every variable: dispatches fetches in load order,
/// applies responses, and cascades resets to dependents when a value changes.
///
/// Fetches run as spawned tasks; their results are applied one at a time by
/// [`process_next`](Self::process_next) or [`settle`](Self::settle).
pub struct ChangePropagationEngine {
    context: EngineContext,
    definitions: Vec<VariableDefinition>,
    fingerprint: String,
    graph: DependencyGraph,
    order: LoadOrder,
    configuration_error: Option<PropagationError>,
    validation: ValidationReport,
    store: VariableStore,
    registry: CancellationRegistry,
    history: HistoryManager,
    time_range: Option<TimeRange>,
    scope_context: ScopeContext,
    sender: mpsc::UnboundedSender<FetchMessage>,
    receiver: mpsc::UnboundedReceiver<FetchMessage>,
}

fn fingerprint(definitions: &[VariableDefinition]) -> String {
    let bytes = serde_json::to_vec(definitions).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

fn compile(definitions: &[VariableDefinition]) -> Compiled {
    let validation = validate_definitions(definitions);
    for issue in &validation.critical_issues {
        error!(target: "dashvars::engine", "{}: {}", issue.issue, issue.details);
    }
    for issue in &validation.warnings {
        warn!(target: "dashvars::engine", "{}: {}", issue.issue, issue.details);
    }

    let (graph, mut configuration_error) = DependencyGraph::build_lenient(definitions);
    let scopes: HashMap<String, _> = definitions.iter().map(|d| (d.name.clone(), d.scope)).collect();
    let order = match schedule(&graph, &scopes) {
        Ok(order) => order,
        Err(err) => {
            error!(target: "dashvars::engine", error = %err, "falling back to definition order");
            configuration_error.get_or_insert(err);
            LoadOrder::sequential(graph.names())
        }
    };

    Compiled { graph, order, configuration_error, validation }
}

impl ChangePropagationEngine {
    pub fn new(context: EngineContext, definitions: Vec<VariableDefinition>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let compiled = compile(&definitions);

        Self {
            history: HistoryManager::new(context.config.history_limit),
            store: VariableStore::new(&definitions),
            fingerprint: fingerprint(&definitions),
            graph: compiled.graph,
            order: compiled.order,
            configuration_error: compiled.configuration_error,
            validation: compiled.validation,
            registry: CancellationRegistry::new(),
            time_range: None,
            scope_context: ScopeContext::global(),
            definitions,
            context,
            sender,
            receiver,
        }
    }

    // ---- readers ----

    pub fn subscribe(&self) -> watch::Receiver<VariablesSnapshot> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> VariablesSnapshot {
        self.store.snapshot()
    }

    pub fn record(&self, name: &str) -> Option<&VariableRecord> {
        self.store.get(name)
    }

    pub fn records(&self) -> &[VariableRecord] {
        self.store.records()
    }

    pub fn definitions(&self) -> &[VariableDefinition] {
        &self.definitions
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn load_order(&self) -> &LoadOrder {
        &self.order
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    /// The cycle found while building the graph, if any. The edge closing it
    /// was dropped so resolution can go on.
    pub fn configuration_error(&self) -> Option<&PropagationError> {
        self.configuration_error.as_ref()
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    pub fn scope_context(&self) -> &ScopeContext {
        &self.scope_context
    }

    pub fn in_flight(&self) -> usize {
        self.registry.in_flight()
    }

    pub fn is_variables_loading(&self) -> bool {
        self.store.is_variables_loading()
    }

    /// Variables rendered in the current scope context.
    pub fn visible_variables(&self) -> Vec<VariableRecord> {
        visible_for_render(self.store.records(), &self.scope_context)
    }

    /// Variables a query running in `context` may substitute.
    pub fn variables_for(&self, context: &ScopeContext) -> Vec<VariableRecord> {
        visible_for_consumption(self.store.records(), context)
    }

    fn definition(&self, name: &str) -> Option<&VariableDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    // ---- operations ----

    /// First load. Initial values seed the old-value snapshot; nothing is
    /// resolved until a valid time range is known.
    pub async fn load(&mut self, time_range: Option<TimeRange>, initial: &InitialValues) -> Result<(), PropagationError> {
        for def in &self.definitions {
            if let Some(value) = initial.decode_for(def) {
                debug!(target: "dashvars::engine", variable = %def.name, value = %value.display(), "seeded initial value");
                self.store.seed_old_value(&def.name, value);
            }
        }

        match time_range {
            Some(range) => self.set_time_range(range).await,
            None => {
                warn!(target: "dashvars::engine", "no time range; resolution skipped");
                Ok(())
            }
        }
    }

    /// Replaces the time range and reloads everything. An invalid range is
    /// rejected without touching any variable.
    pub async fn set_time_range(&mut self, range: TimeRange) -> Result<(), PropagationError> {
        if !range.is_valid() {
            warn!(
                target: "dashvars::engine",
                start = %range.start_time,
                end = %range.end_time,
                "invalid time range; resolution skipped"
            );
            return Err(PropagationError::InvalidTimeRange(format!(
                "start {} is not before end {}",
                range.start_time.to_rfc3339(),
                range.end_time.to_rfc3339()
            )));
        }

        self.time_range = Some(range);
        self.restart().await
    }

    pub async fn set_scope_context(&mut self, context: ScopeContext) -> Result<(), PropagationError> {
        if context == self.scope_context {
            return Ok(());
        }
        self.scope_context = context;
        if self.has_valid_range() {
            self.restart().await?;
        }
        Ok(())
    }

    /// Swaps in a new definition list. Returns `false` when it is identical
    /// to the current one.
    pub async fn update_definitions(&mut self, definitions: Vec<VariableDefinition>) -> Result<bool, PropagationError> {
        let next = fingerprint(&definitions);
        if next == self.fingerprint {
            debug!(target: "dashvars::engine", "definitions unchanged");
            return Ok(false);
        }

        let cancelled = self.registry.cancel_all();
        self.cancel_backend(cancelled).await;

        let compiled = compile(&definitions);
        self.graph = compiled.graph;
        self.order = compiled.order;
        self.configuration_error = compiled.configuration_error;
        self.validation = compiled.validation;
        self.store.rebuild(&definitions);
        self.definitions = definitions;
        self.fingerprint = next;
        info!(target: "dashvars::engine", variables = self.definitions.len(), "definitions updated");

        if self.has_valid_range() {
            self.restart().await?;
        } else {
            self.store.emit();
        }
        Ok(true)
    }

    /// User or system selection on `name`. Every transitive dependent is
    /// reset and resolved again.
    pub async fn set_value(&mut self, name: &str, value: VariableValue) -> Result<PropagationResult, PropagationError> {
        let def = self.definition(name)
            .cloned()
            .ok_or_else(|| PropagationError::VariableNotFound(name.to_string()))?;

        if def.variable_type() == VariableType::Constant {
            return Err(PropagationError::ConstantVariable(name.to_string()));
        }

        let value = coerce_value(&def, value);
        let mut result = PropagationResult {
            changed_variable: name.to_string(),
            ..Default::default()
        };

        let state = self.store.state(name);
        if state == Some(LoadState::Resolved) && self.store.value(name) == Some(&value) {
            debug!(target: "dashvars::engine", variable = %name, "value unchanged");
            return Ok(result);
        }

        if let Some(cancelled) = self.registry.cancel(name) {
            result.cancelled_fetches += self.cancel_backend(vec![cancelled]).await;
        }

        if state == Some(LoadState::Idle) {
            self.store.reset(name)?;
        }
        self.store.apply_value(name, value.clone())?;
        if value.is_empty() {
            self.store.forget_old_value(name);
        }
        self.history.record(name, EventKind::ValueChanged, Some(value.display()), None);
        info!(target: "dashvars::engine", variable = %name, value = %value.display(), "value changed");

        let (reset, cancelled) = self.reset_descendants(name, true).await?;
        result.reset_variables = reset;
        result.cancelled_fetches += cancelled;

        self.dispatch().await?;
        self.store.emit();
        Ok(result)
    }

    /// Refetches the options of a query_values variable filtered by
    /// `keyword`. The selected value is left alone.
    pub async fn search(&mut self, name: &str, keyword: &str) -> Result<bool, PropagationError> {
        let def = self.definition(name)
            .cloned()
            .ok_or_else(|| PropagationError::VariableNotFound(name.to_string()))?;

        let Some(query) = def.query_data() else {
            return Ok(false);
        };
        if self.store.state(name) != Some(LoadState::Resolved) {
            debug!(target: "dashvars::engine", variable = %name, "search ignored while loading");
            return Ok(false);
        }
        if let Some(parent) = self.empty_parent(name) {
            debug!(target: "dashvars::engine", variable = %name, parent = %parent, "search skipped, no upstream data");
            return Ok(false);
        }
        let Some(range) = self.time_range.filter(TimeRange::is_valid) else {
            return Ok(false);
        };

        let request = build_request(
            query,
            |n| self.store.value(n).cloned(),
            &range,
            self.context.config.default_max_record_size,
            Some(keyword),
        );

        let (ticket, superseded) = self.registry.begin(name);
        if let Some(superseded) = superseded {
            self.cancel_backend(vec![superseded]).await;
        }
        self.store.replace_options(name, Vec::new())?;
        self.history.record(name, EventKind::FetchStarted, None, Some(format!("search '{}'", keyword)));
        self.spawn_fetch(ticket, request, FetchPurpose::Search);
        self.store.emit();
        Ok(true)
    }

    /// Dropdown opened. Fetches only when the variable has no value or no
    /// options yet.
    pub async fn open_dropdown(&mut self, name: &str) -> Result<bool, PropagationError> {
        let def = self.definition(name)
            .cloned()
            .ok_or_else(|| PropagationError::VariableNotFound(name.to_string()))?;

        let Some(query) = def.query_data() else {
            return Ok(false);
        };
        let Some(record) = self.store.get(name) else {
            return Ok(false);
        };
        if record.state != LoadState::Resolved {
            return Ok(false);
        }
        if let Some(parent) = self.empty_parent(name) {
            debug!(target: "dashvars::engine", variable = %name, parent = %parent, "dropdown fetch skipped, no upstream data");
            return Ok(false);
        }
        if !record.value.is_empty() && !record.options.is_empty() {
            debug!(target: "dashvars::engine", variable = %name, "dropdown already populated");
            return Ok(false);
        }
        let Some(range) = self.time_range.filter(TimeRange::is_valid) else {
            return Ok(false);
        };

        let request = build_request(
            query,
            |n| self.store.value(n).cloned(),
            &range,
            self.context.config.default_max_record_size,
            None,
        );

        let (ticket, superseded) = self.registry.begin(name);
        if let Some(superseded) = superseded {
            self.cancel_backend(vec![superseded]).await;
        }
        self.store.begin_loading(name)?;
        self.history.record(name, EventKind::FetchStarted, None, request.filter_query.clone());
        self.spawn_fetch(ticket, request, FetchPurpose::Load);
        self.store.emit();
        Ok(true)
    }

    /// Applies the next fetch result. Returns `false` once nothing is in flight.
    pub async fn process_next(&mut self) -> Result<bool, PropagationError> {
        if self.registry.in_flight() == 0 {
            return Ok(false);
        }

        let Some(message) = self.receiver.recv().await else {
            return Ok(false);
        };

        self.handle(message).await?;
        self.dispatch().await?;
        self.store.emit();
        Ok(true)
    }

    /// Runs until every fetch has been applied.
    pub async fn settle(&mut self) -> Result<(), PropagationError> {
        while self.process_next().await? {}
        Ok(())
    }

    // ---- internals ----

    fn has_valid_range(&self) -> bool {
        self.time_range.map_or(false, |r| r.is_valid())
    }

    /// Cancels everything, resets every variable and starts a fresh pass.
    async fn restart(&mut self) -> Result<(), PropagationError> {
        let cancelled = self.registry.cancel_all();
        self.cancel_backend(cancelled).await;

        for name in self.order.names().to_vec() {
            self.store.reset(&name)?;
            self.history.record(&name, EventKind::Reset, None, None);
        }

        self.dispatch().await?;
        self.store.emit();
        Ok(())
    }

    async fn cancel_backend(&mut self, cancelled: Vec<CancelledFetch>) -> usize {
        let count = cancelled.len();
        for fetch in cancelled {
            debug!(target: "dashvars::engine", variable = %fetch.name, "cancelled in-flight fetch");
            self.history.record(&fetch.name, EventKind::Cancelled, None, Some(fetch.trace_id.clone()));
            if self.context.config.fetch_mode == FetchMode::Stream {
                self.context.service.cancel(&fetch.trace_id).await;
            }
        }
        count
    }

    /// Resets everything downstream of `name`. With `forget_old` the
    /// descendants also lose their old-value snapshot.
    async fn reset_descendants(&mut self, name: &str, forget_old: bool) -> Result<(Vec<String>, usize), PropagationError> {
        let descendants = self.graph.descendants(name);
        let mut cancelled = Vec::new();

        for dependent in &descendants {
            if let Some(fetch) = self.registry.cancel(dependent) {
                cancelled.push(fetch);
            }
            if forget_old {
                self.store.reset_descendant(dependent)?;
            } else {
                self.store.reset(dependent)?;
            }
            self.history.record(dependent, EventKind::Reset, None, Some(format!("${} changed", name)));
        }

        let count = self.cancel_backend(cancelled).await;
        Ok((descendants, count))
    }

    /// First parent that resolved without a value.
    fn empty_parent(&self, name: &str) -> Option<String> {
        self.graph.parent_variables(name).into_iter().find(|parent| {
            self.store.get(parent)
                .map_or(false, |r| r.state == LoadState::Resolved && r.value.is_empty())
        })
    }

    fn readiness(&self, position: usize, name: &str) -> Readiness {
        let rank = self.store.get(name).map_or(0, |r| r.scope.rank());
        let outer_scope_loading = self.order.names()[..position]
            .iter()
            .filter_map(|earlier| self.store.get(earlier))
            .any(|r| r.scope.rank() < rank && !r.is_variable_partial_loaded());
        if outer_scope_loading {
            return Readiness::Wait;
        }

        if let Some(parent) = self.empty_parent(name) {
            return Readiness::NoUpstreamData(parent);
        }

        let waiting = self.graph.parent_variables(name).iter()
            .filter_map(|parent| self.store.get(parent))
            .any(|record| !(record.is_variable_partial_loaded() && !record.value.is_empty()));

        if waiting {
            Readiness::Wait
        } else {
            Readiness::Ready
        }
    }

    /// Starts every pending variable whose parents are ready, in load order,
    /// until a pass makes no progress.
    async fn dispatch(&mut self) -> Result<(), PropagationError> {
        loop {
            let mut progressed = false;
            let names = self.order.names().to_vec();

            for (position, name) in names.iter().enumerate() {
                if self.store.state(name) != Some(LoadState::Pending) {
                    continue;
                }

                match self.readiness(position, name) {
                    Readiness::Wait => {}
                    Readiness::NoUpstreamData(parent) => {
                        self.store.resolve_empty(name)?;
                        self.history.record(name, EventKind::ShortCircuited, None, Some(format!("${} is empty", parent)));
                        info!(target: "dashvars::engine", variable = %name, parent = %parent, "no upstream data");
                        progressed = true;
                    }
                    Readiness::Ready => {
                        if self.start(name).await? {
                            progressed = true;
                        }
                    }
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    async fn start(&mut self, name: &str) -> Result<bool, PropagationError> {
        let Some(def) = self.definition(name).cloned() else {
            return Ok(false);
        };

        let Some(query) = def.query_data() else {
            let resolution = resolve_static(&def, self.store.old_value(name));
            let value = resolution.value.clone();
            self.store.resolve(name, resolution.value, resolution.options)?;
            self.history.record(name, EventKind::Resolved, Some(value.display()), None);
            info!(target: "dashvars::engine", variable = %name, value = %value.display(), "resolved");
            return Ok(true);
        };

        let Some(range) = self.time_range.filter(TimeRange::is_valid) else {
            debug!(target: "dashvars::engine", variable = %name, "waiting for a valid time range");
            return Ok(false);
        };

        let request = build_request(
            query,
            |n| self.store.value(n).cloned(),
            &range,
            self.context.config.default_max_record_size,
            None,
        );

        let (ticket, superseded) = self.registry.begin(name);
        if let Some(superseded) = superseded {
            self.cancel_backend(vec![superseded]).await;
        }

        self.store.begin_loading(name)?;
        if self.store.old_value(name).is_none() {
            if let Some(preset) = preset_value(&def) {
                debug!(target: "dashvars::engine", variable = %name, value = %preset.display(), "preset applied");
                self.store.apply_preset(name, preset)?;
            }
        }

        self.history.record(name, EventKind::FetchStarted, None, request.filter_query.clone());
        debug!(target: "dashvars::engine", variable = %name, filter = ?request.filter_query, "dispatching fetch");
        self.spawn_fetch(ticket, request, FetchPurpose::Load);
        Ok(true)
    }

    fn spawn_fetch(&self, ticket: FetchTicket, request: FieldValuesRequest, purpose: FetchPurpose) {
        let service = Arc::clone(&self.context.service);
        let sender = self.sender.clone();
        let mode = self.context.config.fetch_mode;

        tokio::spawn(async move {
            let FetchTicket { name, generation, trace_id, token } = ticket;
            let send = |event: FetchEvent| {
                let _ = sender.send(FetchMessage { name: name.clone(), generation, purpose, event });
            };

            match mode {
                FetchMode::Request => {
                    let event = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        result = service.fetch_values(request) => match result {
                            Ok(responses) => FetchEvent::Response(responses),
                            Err(err) => FetchEvent::Failed(err),
                        },
                    };
                    send(event);
                }
                FetchMode::Stream => {
                    let mut events = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        result = service.stream_values(request, trace_id) => match result {
                            Ok(events) => events,
                            Err(err) => {
                                send(FetchEvent::Failed(err));
                                return;
                            }
                        },
                    };

                    loop {
                        let event = tokio::select! {
                            biased;
                            _ = token.cancelled() => return,
                            event = events.recv() => event,
                        };
                        match event {
                            Some(StreamEvent::Batch(batch)) => send(FetchEvent::Batch(batch)),
                            Some(StreamEvent::Error(err)) => {
                                send(FetchEvent::Failed(err));
                                return;
                            }
                            Some(StreamEvent::Complete) => {
                                send(FetchEvent::Complete);
                                return;
                            }
                            None => {
                                send(FetchEvent::Failed(FetchError::StreamClosed));
                                return;
                            }
                        }
                    }
                }
            }
        });
    }

    async fn handle(&mut self, message: FetchMessage) -> Result<(), PropagationError> {
        let FetchMessage { name, generation, purpose, event } = message;

        if !self.registry.is_current(&name, generation) {
            debug!(target: "dashvars::engine", variable = %name, generation, "dropping superseded response");
            self.history.record(&name, EventKind::StaleDropped, None, None);
            return Ok(());
        }

        let Some(def) = self.definition(&name).cloned() else {
            self.registry.finish(&name, generation);
            return Ok(());
        };

        match purpose {
            FetchPurpose::Load => self.apply_load_event(&def, generation, event).await,
            FetchPurpose::Search => self.apply_search_event(&def, generation, event),
        }
    }

    fn field_options(&self, def: &VariableDefinition, responses: &[FieldValuesResponse]) -> Vec<crate::core::types::VariableOption> {
        let field = def.query_data().map_or("", |q| q.field.as_str());
        options_from_responses(responses, field, &self.context.config.blank_label)
    }

    fn apply_search_event(&mut self, def: &VariableDefinition, generation: u64, event: FetchEvent) -> Result<(), PropagationError> {
        let name = def.name.as_str();
        match event {
            FetchEvent::Response(responses) => {
                let options = self.field_options(def, &responses);
                self.store.replace_options(name, options)?;
                self.registry.finish(name, generation);
            }
            FetchEvent::Batch(responses) => {
                let options = self.field_options(def, &responses);
                self.store.extend_options(name, options)?;
            }
            FetchEvent::Complete => self.registry.finish(name, generation),
            FetchEvent::Failed(err) => {
                warn!(target: "dashvars::engine", variable = %name, error = %err, "search failed");
                self.history.record(name, EventKind::Failed, None, Some(err.to_string()));
                self.registry.finish(name, generation);
            }
        }
        Ok(())
    }

    async fn apply_load_event(&mut self, def: &VariableDefinition, generation: u64, event: FetchEvent) -> Result<(), PropagationError> {
        let name = def.name.as_str();
        let before = self.store.value(name).cloned().unwrap_or(VariableValue::Null);
        let previous = self.store.old_value(name).cloned();

        match event {
            FetchEvent::Response(responses) => {
                let options = self.field_options(def, &responses);
                let value = select_value(def, &options, previous.as_ref(), &[]);
                self.store.resolve(name, value.clone(), Some(options))?;
                self.registry.finish(name, generation);
                self.history.record(name, EventKind::Resolved, Some(value.display()), None);
                info!(target: "dashvars::engine", variable = %name, value = %value.display(), "resolved");
            }
            FetchEvent::Batch(responses) => {
                let fresh = self.field_options(def, &responses);
                let mut merged = self.store.get(name).map(|r| r.options.clone()).unwrap_or_default();
                for option in &fresh {
                    if !merged.iter().any(|o| o.value == option.value) {
                        merged.push(option.clone());
                    }
                }
                let value = select_value(def, &merged, previous.as_ref(), &[]);
                self.store.merge_batch(name, fresh, value.clone())?;
                self.history.record(
                    name,
                    EventKind::BatchMerged,
                    Some(value.display()),
                    Some(format!("{} options", merged.len())),
                );
            }
            FetchEvent::Complete => {
                let options = self.store.get(name).map(|r| r.options.clone()).unwrap_or_default();
                let value = select_value(def, &options, previous.as_ref(), &[]);
                self.store.resolve(name, value.clone(), None)?;
                self.registry.finish(name, generation);
                self.history.record(name, EventKind::Resolved, Some(value.display()), None);
                info!(target: "dashvars::engine", variable = %name, value = %value.display(), "resolved");
            }
            FetchEvent::Failed(err) => {
                warn!(target: "dashvars::engine", variable = %name, error = %err, "fetch failed");
                self.store.resolve_empty(name)?;
                self.registry.finish(name, generation);
                self.history.record(name, EventKind::Failed, None, Some(err.to_string()));
            }
        }

        // Dependents started from a provisional value run again with their
        // old values kept
        let changed = self.store.value(name).map_or(false, |after| *after != before);
        if changed && self.children_started(name) {
            self.reset_descendants(name, false).await?;
        }
        Ok(())
    }

    fn children_started(&self, name: &str) -> bool {
        self.graph.child_variables(name).iter().any(|child| {
            matches!(self.store.state(child), Some(state) if state != LoadState::Pending && state != LoadState::Idle)
        })
    }
}
