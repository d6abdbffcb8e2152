// File: src/core/resolver.rs
// Per-type resolution: selection defaults, query context, option mapping.
use crate::core::service::{FieldValuesRequest, FieldValuesResponse, QueryCondition};
use crate::core::template::{extract_references, sole_reference, substitute};
use crate::core::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: VariableValue,
    pub options: Option<Vec<VariableOption>>,
}

/// Maps returned distinct values to options. Missing keys are dropped; empty
/// keys become a labelled blank option.
pub fn options_from_responses(
    responses: &[FieldValuesResponse],
    field: &str,
    blank_label: &str,
) -> Vec<VariableOption> {
    let mut options: Vec<VariableOption> = Vec::new();

    for response in responses.iter().filter(|r| r.field == field) {
        for entry in &response.values {
            let Some(key) = &entry.key else {
                continue;
            };
            if options.iter().any(|o| &o.value == key) {
                continue;
            }
            if key.is_empty() {
                options.push(VariableOption::new(blank_label, ""));
            } else {
                options.push(VariableOption::new(key.clone(), key.clone()));
            }
        }
    }

    options
}

/// Shared selection-default policy, in priority order:
/// previous values still offered, preferred (flagged) values, the custom
/// multi-select default, the select-all sentinel, the first non-blank
/// option, then empty.
pub fn select_value(
    def: &VariableDefinition,
    options: &[VariableOption],
    previous: Option<&VariableValue>,
    preferred: &[String],
) -> VariableValue {
    let offered = |v: &str| {
        options.iter().any(|o| o.value == v)
            || (def.multi_select && def.select_all == SelectAllPolicy::All && v == SELECT_ALL_VALUE)
    };

    for candidates in [previous.map(|p| p.values()), Some(preferred.to_vec())].into_iter().flatten() {
        let kept: Vec<String> = candidates.into_iter().filter(|v| offered(v)).collect();
        if let Some(first) = kept.first() {
            return if def.multi_select {
                VariableValue::List(kept)
            } else {
                VariableValue::Str(first.clone())
            };
        }
    }

    if let Some(preset) = preset_value(def) {
        return preset;
    }

    match options.iter().find(|o| !o.value.is_empty()) {
        Some(option) if def.multi_select => VariableValue::List(vec![option.value.clone()]),
        Some(option) => VariableValue::Str(option.value.clone()),
        None => def.empty_value(),
    }
}

/// Configured multi-select default that applies without looking at options.
pub fn preset_value(def: &VariableDefinition) -> Option<VariableValue> {
    if !def.multi_select {
        return None;
    }
    match def.select_all {
        SelectAllPolicy::Custom if !def.custom_multi_select_value.is_empty() => {
            Some(VariableValue::List(def.custom_multi_select_value.clone()))
        }
        SelectAllPolicy::All => Some(VariableValue::List(vec![SELECT_ALL_VALUE.to_string()])),
        _ => None,
    }
}

/// Resolution of types that never fetch.
pub fn resolve_static(def: &VariableDefinition, old: Option<&VariableValue>) -> Resolution {
    match &def.kind {
        VariableKind::Constant { value } => Resolution {
            value: VariableValue::Str(value.clone()),
            options: None,
        },
        VariableKind::Textbox { value } => {
            let value = match old {
                Some(VariableValue::Str(s)) => VariableValue::Str(s.clone()),
                Some(VariableValue::List(items)) if !items.is_empty() => VariableValue::Str(items.join(",")),
                _ => VariableValue::Str(value.clone()),
            };
            Resolution { value, options: None }
        }
        VariableKind::DynamicFilters { value } => {
            let value = match old {
                Some(VariableValue::Filters(filters)) => VariableValue::Filters(filters.clone()),
                _ => VariableValue::Filters(value.clone()),
            };
            Resolution { value, options: None }
        }
        VariableKind::Custom { options } => {
            let mapped: Vec<VariableOption> = options.iter()
                .map(|o| VariableOption::new(o.label.clone(), o.value.clone()))
                .collect();
            let preferred: Vec<String> = options.iter()
                .filter(|o| o.selected)
                .map(|o| o.value.clone())
                .collect();
            let value = select_value(def, &mapped, old, &preferred);
            Resolution { value, options: Some(mapped) }
        }
        VariableKind::QueryValues { .. } => Resolution {
            value: def.empty_value(),
            options: None,
        },
    }
}

/// Shapes a caller-supplied value to what the definition holds: lists for
/// multi-select, scalars otherwise, filter arrays for dynamic_filters.
pub fn coerce_value(def: &VariableDefinition, value: VariableValue) -> VariableValue {
    match (&def.kind, value) {
        (VariableKind::DynamicFilters { .. }, VariableValue::Filters(filters)) => VariableValue::Filters(filters),
        (VariableKind::DynamicFilters { .. }, _) => VariableValue::Filters(Vec::new()),
        (_, VariableValue::Filters(_)) => def.empty_value(),
        (_, VariableValue::Str(s)) if def.multi_select => VariableValue::List(vec![s]),
        (_, VariableValue::List(items)) if !def.multi_select => match items.into_iter().next() {
            Some(first) => VariableValue::Str(first),
            None => VariableValue::Null,
        },
        (_, VariableValue::Null) => def.empty_value(),
        (_, value) => value,
    }
}

/// Substitutes current variable values into a query_values filter list.
/// Conditions whose referenced value is the select-all sentinel, or whose
/// value is blank, are omitted.
pub fn build_conditions<F>(query: &QueryData, lookup: F) -> Vec<QueryCondition>
where
    F: Fn(&str) -> Option<VariableValue>,
{
    let mut conditions = Vec::new();

    for filter in &query.filter {
        if filter.name.trim().is_empty() || filter.value.trim().is_empty() {
            continue;
        }

        let references = extract_references(&filter.value);
        let resolved: Vec<(String, VariableValue)> = references.iter()
            .filter_map(|name| lookup(name).map(|v| (name.clone(), v)))
            .collect();

        if resolved.iter().any(|(_, v)| v.is_select_all() || matches!(v, VariableValue::Filters(_))) {
            continue;
        }

        let values = match sole_reference(&filter.value) {
            Some(name) => match resolved.iter().find(|(n, _)| *n == name) {
                Some((_, value)) => value.values(),
                None => vec![filter.value.clone()],
            },
            None => {
                let rendered = substitute(&filter.value, |name| {
                    resolved.iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v.values().join(","))
                });
                vec![rendered]
            }
        };

        if values.is_empty() {
            continue;
        }

        let operator = match filter.operator {
            FilterOperator::Eq if values.len() > 1 => FilterOperator::In,
            FilterOperator::NotEq if values.len() > 1 => FilterOperator::NotIn,
            other => other,
        };

        conditions.push(QueryCondition {
            field: filter.name.clone(),
            operator,
            values,
        });
    }

    conditions
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn render_condition(condition: &QueryCondition) -> String {
    let first = condition.values.first().map(String::as_str).unwrap_or("");
    match condition.operator {
        FilterOperator::In | FilterOperator::NotIn => {
            let list: Vec<String> = condition.values.iter().map(|v| quote(v)).collect();
            format!("{} {} ({})", condition.field, condition.operator.symbol(), list.join(","))
        }
        FilterOperator::StrMatch | FilterOperator::StrMatchIgnoreCase => {
            format!("{}({}, {})", condition.operator.symbol(), condition.field, quote(first))
        }
        _ => format!("{}{}{}", condition.field, condition.operator.symbol(), quote(first)),
    }
}

pub fn render_filter_query(conditions: &[QueryCondition]) -> Option<String> {
    if conditions.is_empty() {
        return None;
    }
    let parts: Vec<String> = conditions.iter().map(render_condition).collect();
    Some(parts.join(" AND "))
}

pub fn build_request<F>(
    query: &QueryData,
    lookup: F,
    time_range: &TimeRange,
    default_size: usize,
    keyword: Option<&str>,
) -> FieldValuesRequest
where
    F: Fn(&str) -> Option<VariableValue>,
{
    let conditions = build_conditions(query, lookup);
    FieldValuesRequest {
        stream: query.stream.clone(),
        stream_type: query.stream_type.clone(),
        fields: vec![query.field.clone()],
        start_time: time_range.start_micros(),
        end_time: time_range.end_micros(),
        size: query.max_record_size.unwrap_or(default_size),
        filter_query: render_filter_query(&conditions),
        conditions,
        keyword: keyword.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string),
    }
}
