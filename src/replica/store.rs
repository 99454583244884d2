//! In-memory versioned entry store
//!
//! Each key is an independent last-write-wins register. The lock guards only
//! the map lookup or mutation; callers never hold it across I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// A value plus the coordinator timestamp (nanoseconds) that versions it.
///
/// Wire format is exactly `{"value": string, "timestamp": int64}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub value: String,
    pub timestamp: i64,
}

impl Entry {
    pub fn new(value: impl Into<String>, timestamp: i64) -> Self {
        Self {
            value: value.into(),
            timestamp,
        }
    }

    /// Strictly newer than `other`; ties favour the entry already stored.
    pub fn supersedes(&self, other: &Entry) -> bool {
        self.timestamp > other.timestamp
    }
}

/// Key → [`Entry`] map, shared by readers, exclusive for writers
#[derive(Debug, Default)]
pub struct EntryStore {
    data: RwLock<HashMap<String, Entry>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Entry> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store `candidate` only if it is strictly newer than what is there.
    /// An absent key accepts any candidate. Returns whether it was applied.
    pub fn apply_if_newer(&self, key: &str, candidate: Entry) -> bool {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        match data.get_mut(key) {
            Some(current) if !candidate.supersedes(current) => false,
            Some(current) => {
                *current = candidate;
                true
            }
            None => {
                data.insert(key.to_string(), candidate);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
