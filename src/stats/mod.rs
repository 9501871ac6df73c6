//! In-process statistics counter
//!
//! Engines report named increments and timed samples; the counter aggregates
//! them and periodically emits one event per key on the
//! [`crate::logging::STATS_TARGET`] target before resetting.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::logging::STATS_TARGET;

/// Aggregated value of one counter key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountEntry {
    /// Summed increments
    pub count: u64,

    /// Summed elapsed time, only set for timed keys
    pub time_cost: Option<Duration>,
}

impl CountEntry {
    /// Average seconds spent per counted unit
    pub fn seconds_per_count(&self) -> Option<f64> {
        match self.time_cost {
            Some(cost) if self.count > 0 => Some(cost.as_secs_f64() / self.count as f64),
            _ => None,
        }
    }
}

/// Shared statistics counter
#[derive(Debug, Default)]
pub struct Counter {
    entries: Mutex<BTreeMap<String, CountEntry>>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `num` to a plain counter
    pub async fn add_count(&self, key: &str, num: u64) {
        let mut entries = self.entries.lock().await;
        entries.entry(key.to_string()).or_default().count += num;
    }

    /// Add `num` and the elapsed time of the operation that produced it
    pub async fn add_timed(&self, key: &str, num: u64, elapsed: Duration) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        entry.count += num;
        entry.time_cost = Some(entry.time_cost.unwrap_or_default() + elapsed);
    }

    /// Current aggregate without resetting
    pub async fn snapshot(&self) -> BTreeMap<String, CountEntry> {
        self.entries.lock().await.clone()
    }

    /// Emit every key and reset the aggregate
    pub async fn flush(&self) -> BTreeMap<String, CountEntry> {
        let drained = std::mem::take(&mut *self.entries.lock().await);
        for (key, entry) in &drained {
            match entry.seconds_per_count() {
                Some(per_count) => info!(
                    target: STATS_TARGET,
                    key = %key,
                    count = entry.count,
                    seconds_per_count = per_count,
                    "stats"
                ),
                None => info!(target: STATS_TARGET, key = %key, count = entry.count, "stats"),
            }
        }
        drained
    }

    /// Flush on a fixed interval until shutdown is signalled
    pub async fn run(&self, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!(interval_secs = interval.as_secs(), "Counter started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    self.flush().await;
                    debug!("Counter stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    self.flush().await;
                }
            }
        }
    }
}
