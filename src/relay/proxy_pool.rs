//! Rotating pool of short-lived forward proxies
//!
//! The pool grows on every provider refresh and shrinks lazily: expired
//! records are dropped whenever the pool is read, never by a sweep timer.

use crate::config::ProxyConfig;
use crate::error::RelayError;
use crate::models::{ProviderResponse, ProxyRecord};
use crate::relay::http_client::RelayHttpClient;
use crate::relay::scheduler::{CycleReport, PeriodicTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Proxy pool fed by a single provider endpoint
#[derive(Debug)]
pub struct ProxyPool {
    records: RwLock<Vec<ProxyRecord>>,
    provider_url: String,
    default_lifetime: chrono::Duration,
    expiry_margin: chrono::Duration,
    refresh_interval: Duration,
    http: RelayHttpClient,
}

impl ProxyPool {
    pub fn new(config: &ProxyConfig, http: RelayHttpClient) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            provider_url: config.provider_url.clone(),
            default_lifetime: config.default_lifetime(),
            expiry_margin: config.expiry_margin(),
            refresh_interval: config.refresh_interval(),
            http,
        }
    }

    /// Call the provider once and append every returned proxy
    ///
    /// Failures are returned to the caller; nothing is retried here.
    pub async fn refresh(&self) -> Result<usize, RelayError> {
        let response: ProviderResponse = self.http.get_json(None, &self.provider_url, &[]).await?;
        let entries = response.into_entries()?;

        let now = Utc::now();
        let fresh: Vec<ProxyRecord> = entries
            .into_iter()
            .filter_map(|entry| {
                let endpoint = entry.endpoint();
                let record = entry.into_record(now, self.default_lifetime, self.expiry_margin);
                if record.is_none() {
                    warn!(endpoint = %endpoint, "Skipping proxy with out-of-range lifetime");
                }
                record
            })
            .collect();
        let added = fresh.len();

        self.extend(fresh).await;
        let pool_size = self.len().await;
        info!(added, pool_size, "Proxy pool refreshed");

        Ok(added)
    }

    /// Append records as-is
    pub async fn extend(&self, records: impl IntoIterator<Item = ProxyRecord>) {
        self.records.write().await.extend(records);
    }

    /// Pick a random non-expired proxy, or `None` when none is left
    pub async fn pick(&self) -> Option<ProxyRecord> {
        self.pick_at(Utc::now()).await
    }

    /// [`ProxyPool::pick`] against an explicit clock
    pub async fn pick_at(&self, now: DateTime<Utc>) -> Option<ProxyRecord> {
        let mut records = self.records.write().await;
        records.retain(|record| !record.is_expired_at(now));
        records.choose(&mut rand::thread_rng()).cloned()
    }

    /// Remove every record for `endpoint`, returning how many were dropped
    pub async fn evict(&self, endpoint: &str) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.endpoint() != endpoint);
        let evicted = before - records.len();
        if evicted > 0 {
            debug!(endpoint, evicted, "Evicted failing proxy");
        }
        evicted
    }

    /// Number of records currently held, expired ones included
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PeriodicTask for ProxyPool {
    fn name(&self) -> &str {
        "proxy-refresh"
    }

    fn interval(&self) -> Duration {
        self.refresh_interval
    }

    async fn run_cycle(&self) -> Result<CycleReport, RelayError> {
        let added = self.refresh().await?;
        Ok(CycleReport {
            processed: added as u64,
            failed: 0,
        })
    }
}
