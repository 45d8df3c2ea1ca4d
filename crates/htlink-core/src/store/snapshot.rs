// ── Parameter snapshots ──
//
// Immutable result of one polling cycle. A snapshot always carries one
// entry per selected parameter; entries that could not be read keep the
// previous value and timestamp and are flagged by `Validity`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use crate::value::ParamValue;

/// Freshness of a snapshot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Validity {
    /// Read successfully in the cycle that produced the snapshot.
    Fresh,
    /// The bulk response did not contain the parameter.
    NotReported,
    /// The read failed in this cycle.
    ReadFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    /// Last known value; `None` if never read successfully.
    pub value: Option<ParamValue>,
    /// When `value` was read.
    pub timestamp: Option<DateTime<Utc>>,
    pub validity: Validity,
}

impl SnapshotEntry {
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Fresh
    }

    /// Time since the value was read, if there is one.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.timestamp.map(|ts| now - ts)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    /// Sequence number of the cycle that produced this snapshot (0 = none yet).
    pub cycle: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl ParameterSnapshot {
    pub fn get(&self, id: &str) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    /// Value of a parameter only if it is fresh.
    pub fn fresh_value(&self, id: &str) -> Option<&ParamValue> {
        self.get(id)
            .filter(|e| e.is_valid())
            .and_then(|e| e.value.as_ref())
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.get(id).is_some_and(SnapshotEntry::is_valid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fresh_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_valid()).count()
    }

    /// Identifiers whose entry is not fresh.
    pub fn invalid_ids(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_valid())
            .map(|(id, _)| id.as_str())
    }
}

/// Assembles the next snapshot on top of the previous one.
pub(crate) struct SnapshotBuilder {
    previous: Arc<ParameterSnapshot>,
    now: DateTime<Utc>,
    entries: BTreeMap<String, SnapshotEntry>,
}

impl SnapshotBuilder {
    pub(crate) fn new(previous: Arc<ParameterSnapshot>, now: DateTime<Utc>) -> Self {
        Self {
            previous,
            now,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn fresh(&mut self, id: &str, value: ParamValue) {
        self.entries.insert(
            id.to_owned(),
            SnapshotEntry {
                value: Some(value),
                timestamp: Some(self.now),
                validity: Validity::Fresh,
            },
        );
    }

    /// Mark an entry invalid, carrying the previous value and timestamp.
    pub(crate) fn invalid(&mut self, id: &str, validity: Validity) {
        let (value, timestamp) = self
            .previous
            .get(id)
            .map(|e| (e.value.clone(), e.timestamp))
            .unwrap_or_default();
        self.entries.insert(
            id.to_owned(),
            SnapshotEntry {
                value,
                timestamp,
                validity,
            },
        );
    }

    pub(crate) fn finish(self, cycle: u64) -> ParameterSnapshot {
        ParameterSnapshot {
            cycle,
            published_at: Some(self.now),
            entries: self.entries,
        }
    }
}
