//! In-memory driver implementations and helpers for testing Strata
//! services.
//!
//! The drivers here honor the full driver contracts (conflict semantics,
//! soft-delete visibility, retention stamping, single-flight reconnect
//! counting) so coordinator and route tests can observe tier behavior
//! without any real backend. Every driver records its calls into a shared
//! [`CallLog`] and supports per-operation failure injection.

mod eval;

pub mod drivers;
pub mod parser;

pub use drivers::{MemoryAuth, MemoryCache, MemoryDatabase, MemorySearch};
pub use parser::TermParser;

use std::sync::{Arc, Mutex};

/// Shared, ordered record of driver calls, e.g. `"cache.read"`.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        CallLog::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Calls matching a `driver.` prefix.
    pub fn calls_for(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|entry| entry.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
