//! Agreement ledger and per-model error statistics
//!
//! The ledger keys bilateral agreed statements by the ordered
//! (sender, recipient) pair: A→B and B→A are distinct channels, matching
//! the pipe-joined export contract. Writes are last-write-wins within and
//! across rounds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::power::Power;

/// Ordered bilateral channel identifier.
pub type AgreementKey = (Power, Power);

/// Accumulates agreed statements; the latest proposal per directed pair
/// survives, with no merging or conflict resolution.
#[derive(Debug, Clone, Default)]
pub struct AgreementLedger {
    entries: BTreeMap<AgreementKey, String>,
}

impl AgreementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the statement for (sender, recipient).
    pub fn record(&mut self, sender: Power, recipient: Power, statement: impl Into<String>) {
        self.entries.insert((sender, recipient), statement.into());
    }

    pub fn get(&self, sender: Power, recipient: Power) -> Option<&str> {
        self.entries.get(&(sender, recipient)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold another ledger into this one; `other`'s entries win.
    pub fn merge(&mut self, other: AgreementLedger) {
        self.entries.extend(other.entries);
    }

    /// Snapshot for the response boundary: `"SENDER|RECIPIENT"` keys.
    pub fn export(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|((sender, recipient), statement)| {
                (format!("{sender}|{recipient}"), statement.clone())
            })
            .collect()
    }
}

/// Counters for one model identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelErrorStats {
    pub conversation_errors: u64,
}

/// Per-model error counters, monotonically incremented for the lifetime of
/// a session and reported back as a side channel, never as a fault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorStats {
    counters: BTreeMap<String, ModelErrorStats>,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a model so it reports zeroes even on a clean session.
    pub fn register(&mut self, model: &str) {
        self.counters.entry(model.to_string()).or_default();
    }

    pub fn record_conversation_error(&mut self, model: &str) {
        self.counters
            .entry(model.to_string())
            .or_default()
            .conversation_errors += 1;
    }

    pub fn conversation_errors(&self, model: &str) -> u64 {
        self.counters
            .get(model)
            .map(|c| c.conversation_errors)
            .unwrap_or(0)
    }

    pub fn merge(&mut self, other: ErrorStats) {
        for (model, stats) in other.counters {
            self.counters.entry(model).or_default().conversation_errors +=
                stats.conversation_errors;
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, ModelErrorStats> {
        self.counters
    }
}
