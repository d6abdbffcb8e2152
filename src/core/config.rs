// File: src/core/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Request,
    Stream,
}

impl std::str::FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "request" | "http" => Ok(FetchMode::Request),
            "stream" | "streaming" => Ok(FetchMode::Stream),
            other => Err(format!("Unknown fetch mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch_mode: FetchMode,
    /// Used when a query_values variable sets no `max_record_size`.
    pub default_max_record_size: usize,
    pub history_limit: usize,
    pub blank_label: String,
    /// Values per batch emitted by the fixture backend in stream mode.
    pub stream_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_mode: FetchMode::Request,
            default_max_record_size: 10,
            history_limit: 1000,
            blank_label: "<blank>".to_string(),
            stream_batch_size: 2,
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".dashvars").join("config.json")
    }

    /// Defaults, then the JSON file (when present), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let default_path = Self::default_path();
        let explicit = path.is_some();
        let path = path.unwrap_or(default_path.as_path());

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
            serde_json::from_str(&content)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?
        } else {
            if explicit {
                return Err(format!("Config file not found: {}", path.display()));
            }
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("DASHVARS_FETCH_MODE").filter(|s| !s.is_empty()) {
            match mode.parse() {
                Ok(mode) => self.fetch_mode = mode,
                Err(e) => warn!(target: "dashvars::config", "{}", e),
            }
        }
        if let Some(size) = lookup("DASHVARS_MAX_RECORD_SIZE").and_then(|v| v.parse::<usize>().ok()) {
            self.default_max_record_size = size;
        }
        if let Some(limit) = lookup("DASHVARS_HISTORY_LIMIT").and_then(|v| v.parse::<usize>().ok()) {
            self.history_limit = limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"fetch_mode": "stream"}"#).unwrap();
        assert_eq!(config.fetch_mode, FetchMode::Stream);
        assert_eq!(config.default_max_record_size, 10);
        assert_eq!(config.blank_label, "<blank>");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DASHVARS_FETCH_MODE", "streaming"),
            ("DASHVARS_MAX_RECORD_SIZE", "50"),
            ("DASHVARS_HISTORY_LIMIT", "nope"),
        ]);

        let mut config = EngineConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.fetch_mode, FetchMode::Stream);
        assert_eq!(config.default_max_record_size, 50);
        assert_eq!(config.history_limit, 1000);
    }

    #[test]
    fn test_missing_explicit_file() {
        let path = std::env::temp_dir().join("dashvars-does-not-exist.json");
        assert!(EngineConfig::load(Some(&path)).is_err());
    }
}
