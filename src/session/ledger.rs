//! Audit ledger of API exchanges
//!
//! Append-only for the lifetime of the process. Keys are ISO-8601 timestamps
//! with microsecond precision, bumped forward when two records land in the
//! same microsecond, so they are unique and sort chronologically.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One recorded API exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LedgerEntry {
    Exchange {
        request: serde_json::Value,
        response: serde_json::Value,
    },
    Error {
        error: String,
    },
}

impl LedgerEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, LedgerEntry::Error { .. })
    }
}

#[derive(Debug, Default)]
pub struct AuditLedger {
    entries: BTreeMap<String, LedgerEntry>,
    last_micros: i64,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an API call; an error wins over any partial response
    pub fn record_exchange(
        &mut self,
        request: serde_json::Value,
        response: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> String {
        let entry = match error {
            Some(error) => LedgerEntry::Error {
                error: error.to_string(),
            },
            None => LedgerEntry::Exchange {
                request,
                response: response.unwrap_or(serde_json::Value::Null),
            },
        };
        self.insert(entry)
    }

    /// Record a failure that did not come from an API call
    pub fn record_error(&mut self, error: impl Into<String>) -> String {
        self.insert(LedgerEntry::Error {
            error: error.into(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copy for inspection endpoints
    pub fn snapshot(&self) -> BTreeMap<String, LedgerEntry> {
        self.entries.clone()
    }

    fn insert(&mut self, entry: LedgerEntry) -> String {
        let key = self.next_key();
        self.entries.insert(key.clone(), entry);
        key
    }

    fn next_key(&mut self) -> String {
        let micros = Utc::now().timestamp_micros().max(self.last_micros + 1);
        self.last_micros = micros;
        match DateTime::<Utc>::from_timestamp_micros(micros) {
            Some(ts) => ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            None => format!("{:020}", micros),
        }
    }
}
