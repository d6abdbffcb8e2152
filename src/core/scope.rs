// File: src/core/scope.rs
use serde::{Serialize, Deserialize};

use crate::core::store::VariableRecord;
use crate::core::types::{Scope, VariableType};

/// Where variables are being rendered or consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
    pub scope: Scope,
    #[serde(default)]
    pub tab_id: Option<String>,
    #[serde(default)]
    pub panel_id: Option<String>,
}

impl ScopeContext {
    pub fn global() -> Self {
        Self { scope: Scope::Global, tab_id: None, panel_id: None }
    }

    pub fn tab(tab_id: &str) -> Self {
        Self { scope: Scope::Tabs, tab_id: Some(tab_id.to_string()), panel_id: None }
    }

    pub fn panel(tab_id: &str, panel_id: &str) -> Self {
        Self {
            scope: Scope::Panels,
            tab_id: Some(tab_id.to_string()),
            panel_id: Some(panel_id.to_string()),
        }
    }

    fn in_tab(&self, record: &VariableRecord) -> bool {
        self.tab_id.as_ref().map_or(false, |id| record.tabs.contains(id))
    }

    fn in_panel(&self, record: &VariableRecord) -> bool {
        self.panel_id.as_ref().map_or(false, |id| record.panels.contains(id))
    }

    /// Variables rendered at exactly this level.
    pub fn renders(&self, record: &VariableRecord) -> bool {
        match (self.scope, record.scope) {
            (Scope::Global, Scope::Global) => true,
            (Scope::Tabs, Scope::Tabs) => self.in_tab(record),
            (Scope::Panels, Scope::Panels) => self.in_panel(record),
            _ => false,
        }
    }

    /// Variables a query in this context may substitute: its own level plus
    /// every enclosing one.
    pub fn sees(&self, record: &VariableRecord) -> bool {
        match record.scope {
            Scope::Global => true,
            Scope::Tabs => self.scope != Scope::Global && self.in_tab(record),
            Scope::Panels => self.scope == Scope::Panels && self.in_panel(record),
        }
    }
}

fn sorted(mut records: Vec<VariableRecord>) -> Vec<VariableRecord> {
    // dynamic_filters always last; sort is stable
    records.sort_by_key(|r| r.variable_type == VariableType::DynamicFilters);
    records
}

/// ScopeFilter: read-only views over the complete record list.
pub fn visible_for_render(records: &[VariableRecord], context: &ScopeContext) -> Vec<VariableRecord> {
    sorted(records.iter().filter(|r| context.renders(r)).cloned().collect())
}

pub fn visible_for_consumption(records: &[VariableRecord], context: &ScopeContext) -> Vec<VariableRecord> {
    sorted(records.iter().filter(|r| context.sees(r)).cloned().collect())
}
