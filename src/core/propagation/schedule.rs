// File: src/core/propagation/schedule.rs
use std::collections::{HashMap, HashSet};

use super::types::{DependencyGraph, PropagationError};
use crate::core::types::Scope;

/// Order in which variables are resolved. Parents always precede children;
/// otherwise global variables come before tab variables, tab before panel,
/// and zero-dependency variables first within a scope.
#[derive(Debug, Clone, Default)]
pub struct LoadOrder {
    order: Vec<String>,
}

impl LoadOrder {
    pub(crate) fn sequential(names: &[String]) -> Self {
        Self { order: names.to_vec() }
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub fn schedule(graph: &DependencyGraph, scopes: &HashMap<String, Scope>) -> Result<LoadOrder, PropagationError> {
    let mut candidates: Vec<(u8, bool, usize, &String)> = graph.names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let rank = scopes.get(name).map(|s| s.rank()).unwrap_or(0);
            let has_parents = !graph.parent_variables(name).is_empty();
            (rank, has_parents, i, name)
        })
        .collect();
    candidates.sort();

    let mut visitor = Visitor {
        graph,
        done: HashSet::new(),
        stack: Vec::new(),
        order: Vec::new(),
    };

    for (_, _, _, name) in candidates {
        visitor.visit(name)?;
    }

    Ok(LoadOrder { order: visitor.order })
}

struct Visitor<'a> {
    graph: &'a DependencyGraph,
    done: HashSet<String>,
    stack: Vec<String>,
    order: Vec<String>,
}

impl Visitor<'_> {
    fn visit(&mut self, name: &str) -> Result<(), PropagationError> {
        if self.done.contains(name) {
            return Ok(());
        }

        if let Some(start) = self.stack.iter().position(|n| n == name) {
            let mut cycle: Vec<String> = self.stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(PropagationError::CyclicDependency(cycle));
        }

        self.stack.push(name.to_string());
        for parent in self.graph.parent_variables(name) {
            self.visit(&parent)?;
        }
        self.stack.pop();

        self.done.insert(name.to_string());
        self.order.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::*;

    fn var(name: &str, refs: &[&str], scope: Scope) -> VariableDefinition {
        VariableDefinition {
            name: name.to_string(),
            label: None,
            kind: VariableKind::QueryValues {
                query_data: QueryData {
                    stream: "logs".to_string(),
                    stream_type: "logs".to_string(),
                    field: name.to_string(),
                    filter: refs.iter()
                        .map(|r| FilterCondition {
                            name: r.to_string(),
                            operator: FilterOperator::Eq,
                            value: format!("${}", r),
                        })
                        .collect(),
                    max_record_size: None,
                },
            },
            multi_select: false,
            select_all: SelectAllPolicy::None,
            custom_multi_select_value: vec![],
            scope,
            tabs: vec![],
            panels: vec![],
        }
    }

    fn order_of(defs: &[VariableDefinition]) -> Vec<String> {
        let graph = DependencyGraph::build(defs).unwrap();
        let scopes = defs.iter().map(|d| (d.name.clone(), d.scope)).collect();
        schedule(&graph, &scopes).unwrap().names().to_vec()
    }

    #[test]
    fn test_parents_first() {
        let defs = vec![
            var("pod", &["host"], Scope::Global),
            var("host", &["region"], Scope::Global),
            var("region", &[], Scope::Global),
            var("level", &[], Scope::Global),
        ];
        assert_eq!(order_of(&defs), vec!["region", "level", "host", "pod"]);
    }

    #[test]
    fn test_scope_order() {
        let defs = vec![
            var("panel_var", &[], Scope::Panels),
            var("tab_var", &["region"], Scope::Tabs),
            var("region", &[], Scope::Global),
        ];
        assert_eq!(order_of(&defs), vec!["region", "tab_var", "panel_var"]);
    }

    #[test]
    fn test_dependency_beats_scope() {
        let defs = vec![
            var("global_child", &["tab_parent"], Scope::Global),
            var("tab_parent", &[], Scope::Tabs),
        ];
        let order = order_of(&defs);
        assert_eq!(order, vec!["tab_parent", "global_child"]);
    }

    #[test]
    fn test_cycle_detected() {
        // A cyclic graph can only be assembled by hand; build() refuses it.
        let defs = vec![var("a", &[], Scope::Global), var("b", &[], Scope::Global)];
        let mut graph = DependencyGraph::build(&defs).unwrap();
        let a = graph.node_indices["a"];
        let b = graph.node_indices["b"];
        graph.graph.add_edge(a, b, ());
        graph.graph.add_edge(b, a, ());

        let scopes = HashMap::new();
        match schedule(&graph, &scopes) {
            Err(PropagationError::CyclicDependency(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }
}
