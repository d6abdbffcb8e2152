use std::collections::HashSet;

use crate::core::propagation::{DependencyGraph, PropagationError};
use crate::core::template::extract_references;
use crate::core::types::{Scope, VariableDefinition, VariableKind};

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub critical_issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub validation_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub issue: String,
    pub details: String,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            critical_issues: Vec::new(),
            warnings: Vec::new(),
            validation_time: chrono::Utc::now(),
        }
    }

    pub fn add_critical(&mut self, issue: String, details: String) {
        self.critical_issues.push(ValidationIssue { issue, details });
    }

    pub fn add_warning(&mut self, issue: String, details: String) {
        self.warnings.push(ValidationIssue { issue, details });
    }

    pub fn has_critical_issues(&self) -> bool {
        !self.critical_issues.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.critical_issues.is_empty() && self.warnings.is_empty()
    }

    pub fn format_summary(&self) -> String {
        let mut summary = String::new();

        if !self.critical_issues.is_empty() {
            summary.push_str(&format!("CRITICAL ISSUES ({}):\n", self.critical_issues.len()));
            for issue in &self.critical_issues {
                summary.push_str(&format!("  • {}: {}\n", issue.issue, issue.details));
            }
        }

        if !self.warnings.is_empty() {
            summary.push_str(&format!("WARNINGS ({}):\n", self.warnings.len()));
            for issue in &self.warnings {
                summary.push_str(&format!("  • {}: {}\n", issue.issue, issue.details));
            }
        }

        summary
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_definitions(definitions: &[VariableDefinition]) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mut seen = HashSet::new();
    let known: HashSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();

    for def in definitions {
        if def.name.trim().is_empty() {
            report.add_critical(
                "Variable without a name".to_string(),
                format!("A {} variable has an empty name", def.variable_type().name()),
            );
            continue;
        }

        if !seen.insert(def.name.as_str()) {
            report.add_critical(
                format!("Duplicate variable {}", def.name),
                "Only the first definition is used".to_string(),
            );
        }

        match &def.kind {
            VariableKind::QueryValues { query_data } => {
                if query_data.stream.trim().is_empty() || query_data.field.trim().is_empty() {
                    report.add_critical(
                        format!("Variable {} has no query target", def.name),
                        "query_values variables need both a stream and a field".to_string(),
                    );
                }

                for filter in &query_data.filter {
                    for reference in extract_references(&filter.value) {
                        if reference == def.name {
                            report.add_warning(
                                format!("Variable {} references itself", def.name),
                                format!("Filter on '{}' ignores ${}", filter.name, reference),
                            );
                        } else if !known.contains(reference.as_str()) {
                            report.add_warning(
                                format!("Variable {} references unknown ${}", def.name, reference),
                                format!("Filter on '{}' is sent with the literal text", filter.name),
                            );
                        }
                    }
                }
            }
            VariableKind::Custom { options } if options.is_empty() => {
                report.add_warning(
                    format!("Variable {} has no options", def.name),
                    "It always resolves to an empty value".to_string(),
                );
            }
            _ => {}
        }

        match def.scope {
            Scope::Tabs if def.tabs.is_empty() => report.add_warning(
                format!("Variable {} is tab scoped without tabs", def.name),
                "It is never rendered".to_string(),
            ),
            Scope::Panels if def.panels.is_empty() => report.add_warning(
                format!("Variable {} is panel scoped without panels", def.name),
                "It is never rendered".to_string(),
            ),
            _ => {}
        }
    }

    if let Err(PropagationError::CyclicDependency(path)) = DependencyGraph::build(definitions) {
        report.add_critical(
            "Cyclic variable dependency".to_string(),
            path.join(" -> "),
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<VariableDefinition> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_clean_config() {
        let defs = parse(r#"[
            {"name": "region", "type": "custom", "options": [{"label": "US", "value": "us"}]},
            {"name": "host", "type": "query_values",
             "query_data": {"stream": "logs", "field": "host",
                            "filter": [{"name": "region", "operator": "=", "value": "$region"}]}}
        ]"#);
        assert!(validate_definitions(&defs).is_clean());
    }

    #[test]
    fn test_reports_problems() {
        let defs = parse(r#"[
            {"name": "a", "type": "query_values",
             "query_data": {"stream": "logs", "field": "a",
                            "filter": [{"name": "b", "operator": "=", "value": "$b"},
                                       {"name": "x", "operator": "=", "value": "$nope"}]}},
            {"name": "b", "type": "query_values",
             "query_data": {"stream": "logs", "field": "",
                            "filter": [{"name": "a", "operator": "=", "value": "$a"}]}},
            {"name": "b", "type": "textbox"},
            {"name": "t", "type": "custom", "scope": "tabs"}
        ]"#);

        let report = validate_definitions(&defs);
        assert!(report.has_critical_issues());

        let critical: Vec<&str> = report.critical_issues.iter().map(|i| i.issue.as_str()).collect();
        assert!(critical.contains(&"Duplicate variable b"));
        assert!(critical.contains(&"Variable b has no query target"));
        assert!(critical.contains(&"Cyclic variable dependency"));

        // unknown reference, empty custom options, tab scope without tabs
        assert_eq!(report.warnings.len(), 3);
        assert!(report.format_summary().contains("WARNINGS (3)"));
    }
}
