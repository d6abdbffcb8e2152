use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::fmt;

/// Sentinel selected when a multi-select variable is configured to pick everything.
pub const SELECT_ALL_VALUE: &str = "(ALL)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Null,
    Str(String),
    List(Vec<String>),
    Filters(Vec<AdHocFilter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    QueryValues,
    Custom,
    Constant,
    Textbox,
    DynamicFilters,
}

impl VariableType {
    pub fn name(&self) -> &'static str {
        match self {
            VariableType::QueryValues => "query_values",
            VariableType::Custom => "custom",
            VariableType::Constant => "constant",
            VariableType::Textbox => "textbox",
            VariableType::DynamicFilters => "dynamic_filters",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Global,
    Tabs,
    Panels,
}

impl Scope {
    // Resolution order: global first, panels last.
    pub fn rank(&self) -> u8 {
        match self {
            Scope::Global => 0,
            Scope::Tabs => 1,
            Scope::Panels => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectAllPolicy {
    #[default]
    None,
    Custom,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "str_match")]
    StrMatch,
    #[serde(rename = "str_match_ignore_case")]
    StrMatchIgnoreCase,
}

impl FilterOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Lt => "<",
            FilterOperator::Gt => ">",
            FilterOperator::LtEq => "<=",
            FilterOperator::GtEq => ">=",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::StrMatch => "str_match",
            FilterOperator::StrMatchIgnoreCase => "str_match_ignore_case",
        }
    }
}

/// One `field <op> value` condition of a query_values variable. `value` may
/// reference other variables as `$name` or `${name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub name: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    pub stream: String,
    #[serde(default = "default_stream_type")]
    pub stream_type: String,
    pub field: String,
    #[serde(default)]
    pub filter: Vec<FilterCondition>,
    #[serde(default)]
    pub max_record_size: Option<usize>,
}

fn default_stream_type() -> String {
    "logs".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOption {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdHocFilter {
    pub name: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableKind {
    QueryValues {
        query_data: QueryData,
    },
    Custom {
        #[serde(default)]
        options: Vec<CustomOption>,
    },
    Constant {
        #[serde(default)]
        value: String,
    },
    Textbox {
        #[serde(default)]
        value: String,
    },
    DynamicFilters {
        #[serde(default)]
        value: Vec<AdHocFilter>,
    },
}

impl VariableKind {
    pub fn variable_type(&self) -> VariableType {
        match self {
            VariableKind::QueryValues { .. } => VariableType::QueryValues,
            VariableKind::Custom { .. } => VariableType::Custom,
            VariableKind::Constant { .. } => VariableType::Constant,
            VariableKind::Textbox { .. } => VariableType::Textbox,
            VariableKind::DynamicFilters { .. } => VariableType::DynamicFilters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: VariableKind,
    #[serde(default, rename = "multiSelect")]
    pub multi_select: bool,
    #[serde(default, rename = "selectAllValueForMultiSelect")]
    pub select_all: SelectAllPolicy,
    #[serde(default, rename = "customMultiSelectValue")]
    pub custom_multi_select_value: Vec<String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub tabs: Vec<String>,
    #[serde(default)]
    pub panels: Vec<String>,
}

impl VariableDefinition {
    pub fn variable_type(&self) -> VariableType {
        self.kind.variable_type()
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().filter(|l| !l.is_empty()).unwrap_or(&self.name)
    }

    pub fn query_data(&self) -> Option<&QueryData> {
        match &self.kind {
            VariableKind::QueryValues { query_data } => Some(query_data),
            _ => None,
        }
    }

    /// The value a variable of this definition holds while it has nothing selected.
    pub fn empty_value(&self) -> VariableValue {
        match self.kind {
            VariableKind::DynamicFilters { .. } => VariableValue::Filters(Vec::new()),
            _ if self.multi_select => VariableValue::List(Vec::new()),
            _ => VariableValue::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOption {
    pub label: String,
    pub value: String,
}

impl VariableOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self { start_time, end_time }
    }

    pub fn is_valid(&self) -> bool {
        self.start_time < self.end_time
    }

    pub fn start_micros(&self) -> i64 {
        self.start_time.timestamp_micros()
    }

    pub fn end_micros(&self) -> i64 {
        self.end_time.timestamp_micros()
    }
}

impl VariableValue {
    /// Null and empty lists carry no data downstream. A blank string is a
    /// real selection and ad-hoc filter lists never block children.
    pub fn is_empty(&self) -> bool {
        match self {
            VariableValue::Null => true,
            VariableValue::List(items) => items.is_empty(),
            VariableValue::Str(_) | VariableValue::Filters(_) => false,
        }
    }

    pub fn is_select_all(&self) -> bool {
        match self {
            VariableValue::Str(s) => s == SELECT_ALL_VALUE,
            VariableValue::List(items) => items.iter().any(|v| v == SELECT_ALL_VALUE),
            _ => false,
        }
    }

    /// Selected scalar values, in order.
    pub fn values(&self) -> Vec<String> {
        match self {
            VariableValue::Null | VariableValue::Filters(_) => Vec::new(),
            VariableValue::Str(s) => vec![s.clone()],
            VariableValue::List(items) => items.clone(),
        }
    }

    pub fn display(&self) -> String {
        match self {
            VariableValue::Null => "null".to_string(),
            VariableValue::Str(s) => format!("\"{}\"", s),
            VariableValue::List(items) => {
                let item_strings: Vec<String> = items.iter().map(|item| format!("\"{}\"", item)).collect();
                format!("[{}]", item_strings.join(", "))
            },
            VariableValue::Filters(filters) => {
                let item_strings: Vec<String> = filters.iter()
                    .map(|f| format!("{} {} {}", f.name, f.operator, f.value))
                    .collect();
                format!("{{{}}}", item_strings.join(", "))
            },
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Null => write!(f, ""),
            VariableValue::Str(s) => write!(f, "{}", s),
            VariableValue::List(items) => write!(f, "{}", items.join(",")),
            VariableValue::Filters(_) => write!(f, "{}", self.display()),
        }
    }
}
