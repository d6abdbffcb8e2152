// File: src/core/initial.rs
// Initial values read from the dashboard URL (`var-<name>=...`).
use std::collections::HashMap;
use base64::Engine;
use tracing::warn;

use crate::core::types::{AdHocFilter, VariableDefinition, VariableKind, VariableValue};

pub const QUERY_PREFIX: &str = "var-";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialValues {
    raw: HashMap<String, Vec<String>>,
}

impl InitialValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `var-region=eu&var-host=a&var-host=b`. Other keys are ignored.
    /// Values stay encoded until they are decoded against a definition.
    pub fn from_query_string(query: &str) -> Self {
        let mut values = Self::new();
        for pair in query.trim_start_matches('?').split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = decode_component(key);
            if let Some(name) = key.strip_prefix(QUERY_PREFIX) {
                if !name.is_empty() {
                    values.insert(name, value);
                }
            }
        }
        values
    }

    pub fn insert(&mut self, name: &str, encoded: &str) {
        self.raw.entry(name.to_string()).or_default().push(encoded.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.raw.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Decoded value for `def`, or `None` when the URL carries nothing usable.
    /// Constants always come from configuration.
    pub fn decode_for(&self, def: &VariableDefinition) -> Option<VariableValue> {
        let raw = self.raw.get(&def.name)?;
        match &def.kind {
            VariableKind::Constant { .. } => None,
            VariableKind::DynamicFilters { .. } => {
                let first = raw.first()?;
                Some(VariableValue::Filters(decode_filters(&def.name, first)))
            }
            _ if def.multi_select => {
                let values: Vec<String> = raw.iter().map(|v| decode_component(v)).collect();
                Some(VariableValue::List(values))
            }
            _ => raw.first().map(|v| VariableValue::Str(decode_component(v))),
        }
    }
}

/// Ad-hoc filters arrive as a URL-encoded JSON array, optionally base64 wrapped.
fn decode_filters(name: &str, encoded: &str) -> Vec<AdHocFilter> {
    let decoded = decode_component(encoded);
    let trimmed = decoded.trim();

    if trimmed.is_empty() {
        return Vec::new();
    }

    let json = if trimmed.starts_with('[') {
        trimmed.to_string()
    } else {
        // `+` in base64 text was turned into a space by the URL decoding
        let restored = trimmed.replace(' ', "+");
        match base64::engine::general_purpose::STANDARD.decode(restored) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(target: "dashvars::initial", variable = %name, error = %e, "ignoring undecodable filters");
                return Vec::new();
            }
        }
    };

    match serde_json::from_str::<Vec<AdHocFilter>>(&json) {
        Ok(filters) => filters,
        Err(e) => {
            warn!(target: "dashvars::initial", variable = %name, error = %e, "ignoring malformed filters");
            Vec::new()
        }
    }
}

/// Percent decoding with `+` as space. Invalid UTF-8 is replaced.
pub fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
