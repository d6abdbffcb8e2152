// File: src/core/propagation/graph.rs
use super::types::*;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::algo::has_path_connecting;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::core::template::extract_references;
use crate::core::types::VariableDefinition;

impl DependencyGraph {
    fn empty() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Builds the graph, failing on the first dependency cycle.
    pub fn build(definitions: &[VariableDefinition]) -> Result<Self, PropagationError> {
        let (graph, cycle) = Self::build_lenient(definitions);
        match cycle {
            Some(err) => Err(err),
            None => Ok(graph),
        }
    }

    /// Builds the graph, dropping every edge that would close a cycle. The
    /// first cycle found is returned next to the (acyclic) graph.
    pub fn build_lenient(definitions: &[VariableDefinition]) -> (Self, Option<PropagationError>) {
        let mut deps = Self::empty();
        let mut first_cycle = None;

        for def in definitions {
            deps.add_variable(def);
        }

        let known: HashSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();

        for def in definitions {
            for parent in referenced_parents(def, &known) {
                if let Err(err) = deps.add_dependency(&parent, &def.name) {
                    debug!(target: "dashvars::graph", parent = %parent, child = %def.name, "dropping cyclic edge");
                    if first_cycle.is_none() {
                        first_cycle = Some(err);
                    }
                }
            }
        }

        (deps, first_cycle)
    }

    fn add_variable(&mut self, def: &VariableDefinition) {
        if self.node_indices.contains_key(&def.name) {
            return;
        }

        let node = VariableNode {
            name: def.name.clone(),
            variable_type: def.variable_type(),
        };

        let idx = self.graph.add_node(node);
        self.node_indices.insert(def.name.clone(), idx);
        self.names.push(def.name.clone());
    }

    fn add_dependency(&mut self, parent: &str, child: &str) -> Result<(), PropagationError> {
        let parent_idx = self.index(parent)?;
        let child_idx = self.index(child)?;

        if self.graph.contains_edge(parent_idx, child_idx) {
            return Ok(());
        }

        if has_path_connecting(&self.graph, child_idx, parent_idx, None) {
            let mut path = self.find_path(child_idx, parent_idx);
            path.push(child.to_string());
            return Err(PropagationError::CyclicDependency(path));
        }

        self.graph.add_edge(parent_idx, child_idx, ());
        Ok(())
    }

    fn index(&self, name: &str) -> Result<NodeIndex, PropagationError> {
        self.node_indices.get(name)
            .copied()
            .ok_or_else(|| PropagationError::VariableNotFound(name.to_string()))
    }

    fn find_path(&self, start: NodeIndex, end: NodeIndex) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut stack = vec![(start, vec![start])];

        while let Some((node, path)) = stack.pop() {
            if node == end {
                return path.iter().map(|&idx| self.graph[idx].name.clone()).collect();
            }

            if visited.insert(node) {
                for neighbor in self.graph.neighbors(node) {
                    let mut next = path.clone();
                    next.push(neighbor);
                    stack.push((neighbor, next));
                }
            }
        }

        vec![]
    }

    /// Names in definition order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn parent_variables(&self, name: &str) -> Vec<String> {
        self.neighbors_sorted(name, Direction::Incoming)
    }

    pub fn child_variables(&self, name: &str) -> Vec<String> {
        self.neighbors_sorted(name, Direction::Outgoing)
    }

    // petgraph yields neighbors newest-edge first; keep definition order instead
    fn neighbors_sorted(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.node_indices.get(name) else {
            return Vec::new();
        };

        let mut found: Vec<NodeIndex> = self.graph.edges_directed(idx, direction)
            .map(|edge| match direction {
                Direction::Incoming => edge.source(),
                Direction::Outgoing => edge.target(),
            })
            .collect();
        found.sort();
        found.into_iter().map(|i| self.graph[i].name.clone()).collect()
    }

    /// Every transitive dependent of `name`, nearest first. Revisits are skipped.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        visited.insert(name.to_string());
        let mut queue = std::collections::VecDeque::from(vec![name.to_string()]);
        let mut dependents = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.child_variables(&current) {
                if visited.insert(child.clone()) {
                    dependents.push(child.clone());
                    queue.push_back(child);
                }
            }
        }

        dependents
    }

    pub fn entries(&self) -> HashMap<String, DependencyEntry> {
        self.names.iter()
            .map(|name| {
                (name.clone(), DependencyEntry {
                    parent_variables: self.parent_variables(name),
                    child_variables: self.child_variables(name),
                })
            })
            .collect()
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph Variables {\n");
        dot.push_str("  rankdir=LR;\n  node [shape=box];\n\n");

        for name in &self.names {
            let node = &self.graph[self.node_indices[name]];
            dot.push_str(&format!(
                "  \"{}\" [label=\"{} ({})\"];\n",
                name, name, node.variable_type.name()
            ));
        }

        dot.push('\n');

        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()].name;
            let target = &self.graph[edge.target()].name;
            dot.push_str(&format!("  \"{}\" -> \"{}\";\n", source, target));
        }

        dot.push_str("}\n");
        dot
    }
}

/// `$name` references in a query_values variable's filter values, limited to
/// known variables. Self references are discarded; other types never have parents.
pub fn referenced_parents(def: &VariableDefinition, known: &HashSet<&str>) -> Vec<String> {
    let Some(query) = def.query_data() else {
        return Vec::new();
    };

    let mut parents: Vec<String> = Vec::new();
    for condition in &query.filter {
        for name in extract_references(&condition.value) {
            if name != def.name && known.contains(name.as_str()) && !parents.contains(&name) {
                parents.push(name);
            }
        }
    }
    parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::*;

    pub(crate) fn query_var(name: &str, refs: &[&str]) -> VariableDefinition {
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
            scope: Scope::Global,
            tabs: vec![],
            panels: vec![],
        }
    }

    #[test]
    fn test_parents_and_children() {
        let defs = vec![
            query_var("region", &[]),
            query_var("host", &["region", "unknown", "host"]),
            query_var("pod", &["host", "region"]),
        ];

        let graph = DependencyGraph::build(&defs).unwrap();
        assert_eq!(graph.parent_variables("host"), vec!["region"]);
        assert_eq!(graph.parent_variables("pod"), vec!["region", "host"]);
        assert_eq!(graph.child_variables("region"), vec!["host", "pod"]);
        assert!(graph.parent_variables("region").is_empty());
        assert_eq!(graph.descendants("region"), vec!["host", "pod"]);
        assert_eq!(graph.descendants("pod"), Vec::<String>::new());
    }

    #[test]
    fn test_cycle_rejected() {
        let defs = vec![query_var("a", &["b"]), query_var("b", &["a"])];

        match DependencyGraph::build(&defs) {
            Err(PropagationError::CyclicDependency(path)) => {
                assert_eq!(path, vec!["b", "a", "b"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }

        let (graph, cycle) = DependencyGraph::build_lenient(&defs);
        assert!(cycle.is_some());
        assert_eq!(graph.child_variables("b"), vec!["a"]);
        assert!(graph.child_variables("a").is_empty());
    }

    #[test]
    fn test_non_query_variables_have_no_parents() {
        let mut custom = query_var("env", &[]);
        custom.kind = VariableKind::Custom { options: vec![] };
        let defs = vec![custom, query_var("svc", &["env"])];

        let entries = DependencyGraph::build(&defs).unwrap().entries();
        assert!(entries["env"].parent_variables.is_empty());
        assert_eq!(entries["env"].child_variables, vec!["svc"]);
    }

    #[test]
    fn test_dot_output() {
        let defs = vec![query_var("region", &[]), query_var("host", &["region"])];
        let dot = DependencyGraph::build(&defs).unwrap().to_dot();
        assert!(dot.contains("\"region\" -> \"host\";"));
        assert!(dot.contains("host (query_values)"));
    }
}
