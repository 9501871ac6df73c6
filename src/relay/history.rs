//! Time-windowed dedup history of delivered records

use crate::models::GroupRecord;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Identities of delivered records with their creation times
///
/// Keyed by link id, the same identity [`GroupRecord`] uses for equality.
#[derive(Debug, Clone, Default)]
pub struct DedupHistory {
    entries: HashMap<u64, DateTime<Utc>>,
}

impl DedupHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, record: &GroupRecord) -> bool {
        self.entries.contains_key(&record.link_id)
    }

    /// Candidates whose identity has not been delivered yet
    pub fn diff(&self, candidates: &HashSet<GroupRecord>) -> HashSet<GroupRecord> {
        candidates
            .iter()
            .filter(|record| !self.contains(record))
            .cloned()
            .collect()
    }

    /// Record delivered identities
    pub fn merge<'a>(&mut self, delivered: impl IntoIterator<Item = &'a GroupRecord>) {
        for record in delivered {
            self.entries.insert(record.link_id, record.created_at);
        }
    }

    /// Evict entries created at or before `now - retention`, returning how many
    pub fn prune(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let before = self.entries.len();
        self.entries.retain(|_, created_at| *created_at > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
