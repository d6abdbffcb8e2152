use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Reset,
    FetchStarted,
    BatchMerged,
    Resolved,
    ShortCircuited,
    Failed,
    Cancelled,
    StaleDropped,
    ValueChanged,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub variable: String,
    pub kind: EventKind,
    pub value: Option<String>,
    pub detail: Option<String>,
}

/// Bounded log of resolution events, oldest dropped first.
#[derive(Debug)]
pub struct HistoryManager {
    max_entries: usize,
    entries: VecDeque<HistoryEntry>,
    next_sequence: u64,
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: VecDeque::new(),
            next_sequence: 0,
        }
    }

    pub fn record(&mut self, variable: &str, kind: EventKind, value: Option<String>, detail: Option<String>) -> u64 {
        self.next_sequence += 1;
        self.entries.push_back(HistoryEntry {
            id: Uuid::new_v4(),
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            variable: variable.to_string(),
            kind,
            value,
            detail,
        });

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }

        self.next_sequence
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn for_variable<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        self.entries.iter().filter(move |e| e.variable == variable)
    }

    /// Sequence number of the first event of `kind` for `variable`.
    pub fn first_sequence(&self, variable: &str, kind: EventKind) -> Option<u64> {
        self.for_variable(variable).find(|e| e.kind == kind).map(|e| e.sequence)
    }

    pub fn count(&self, variable: &str, kind: EventKind) -> usize {
        self.for_variable(variable).filter(|e| e.kind == kind).count()
    }

    pub fn search(&self, query: &str) -> Vec<&HistoryEntry> {
        let query_lower = query.to_lowercase();
        self.entries.iter()
            .filter(|entry|
                entry.variable.to_lowercase().contains(&query_lower) ||
                entry.value.as_ref().map_or(false, |v| v.to_lowercase().contains(&query_lower)) ||
                entry.detail.as_ref().map_or(false, |d| d.to_lowercase().contains(&query_lower))
            )
            .rev()
            .collect()
    }

    pub fn get_last_n(&self, n: usize) -> Vec<&HistoryEntry> {
        let n = n.min(self.entries.len());
        let start_idx = self.entries.len() - n;
        self.entries.range(start_idx..).collect()
    }

    pub fn export(&self, path: &Path) -> Result<(), String> {
        let entries: Vec<&HistoryEntry> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| format!("Failed to serialize history: {}", e))?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .map_err(|e| format!("Failed to write history: {}", e))?;

        fs::rename(&temp_path, path)
            .map_err(|e| format!("Failed to finalize history export: {}", e))?;

        Ok(())
    }
}
