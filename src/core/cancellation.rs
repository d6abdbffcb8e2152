// File: src/core/cancellation.rs
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle for one in-flight operation. Responses carry `generation` back so
/// the engine can tell whether they were superseded.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub name: String,
    pub generation: u64,
    pub trace_id: String,
    pub token: CancellationToken,
}

#[derive(Debug)]
struct ActiveFetch {
    generation: u64,
    token: CancellationToken,
    trace_id: String,
}

/// Cancelled operation, returned so the caller can also cancel the backend
/// stream behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledFetch {
    pub name: String,
    pub trace_id: String,
}

/// At most one live operation per variable name.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    active: HashMap<String, ActiveFetch>,
    next_generation: u64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new operation for `name`, cancelling the previous one.
    pub fn begin(&mut self, name: &str) -> (FetchTicket, Option<CancelledFetch>) {
        let cancelled = self.cancel(name);

        self.next_generation += 1;
        let ticket = FetchTicket {
            name: name.to_string(),
            generation: self.next_generation,
            trace_id: Uuid::new_v4().simple().to_string(),
            token: CancellationToken::new(),
        };

        self.active.insert(name.to_string(), ActiveFetch {
            generation: ticket.generation,
            token: ticket.token.clone(),
            trace_id: ticket.trace_id.clone(),
        });

        (ticket, cancelled)
    }

    pub fn cancel(&mut self, name: &str) -> Option<CancelledFetch> {
        self.active.remove(name).map(|entry| {
            entry.token.cancel();
            CancelledFetch {
                name: name.to_string(),
                trace_id: entry.trace_id,
            }
        })
    }

    pub fn cancel_all(&mut self) -> Vec<CancelledFetch> {
        let mut names: Vec<String> = self.active.keys().cloned().collect();
        names.sort();
        names.iter().filter_map(|name| self.cancel(name)).collect()
    }

    /// Stale-response guard.
    pub fn is_current(&self, name: &str, generation: u64) -> bool {
        self.active.get(name).map_or(false, |entry| entry.generation == generation)
    }

    /// Clears the entry if it still belongs to `generation`.
    pub fn finish(&mut self, name: &str, generation: u64) {
        if self.is_current(name, generation) {
            self.active.remove(name);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.active.len()
    }
}
