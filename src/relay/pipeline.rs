//! Fetch, dedup and forward pipeline
//!
//! One cycle fetches several source pages concurrently (each through its own
//! proxy pick and retry policy), normalises the items into [`GroupRecord`]s,
//! removes identities already in the [`DedupHistory`], forwards the delta to
//! the sink under a concurrency cap, and finally prunes the history and
//! merges the successful deliveries into it.

use crate::config::Config;
use crate::error::RelayError;
use crate::models::{GroupRecord, SinkReply, SourcePage};
use crate::relay::history::DedupHistory;
use crate::relay::http_client::RelayHttpClient;
use crate::relay::proxy_pool::ProxyPool;
use crate::relay::retry::RetryPolicy;
use crate::relay::scheduler::{CycleReport, PeriodicTask};
use crate::stats::Counter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// Static parameters of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub source_url: String,
    pub page_size: u32,
    pub page_count: u32,
    pub sink_url: String,
    pub source_tag: String,
    pub retention: chrono::Duration,
    pub interval: Duration,
    pub max_concurrent: usize,
    pub evict_on_failure: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_url: config.source.url.clone(),
            page_size: config.source.page_size,
            page_count: config.source.page_count,
            sink_url: config.sink.url.clone(),
            source_tag: config.sink.source_tag.clone(),
            retention: config.harvest.retention(),
            interval: config.harvest.interval(),
            max_concurrent: config.harvest.max_concurrent,
            evict_on_failure: config.proxy.evict_on_failure,
        }
    }

    /// Offsets of the pages fetched each cycle
    pub fn page_offsets(&self) -> Vec<u64> {
        (0..self.page_count as u64)
            .map(|index| self.page_size as u64 * index)
            .collect()
    }
}

/// Counts for one pipeline cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestReport {
    /// Pages fetched successfully
    pub pages_ok: usize,
    /// Pages dropped after retry exhaustion
    pub pages_failed: usize,
    /// Raw items across successful pages
    pub items: usize,
    /// Distinct records after normalisation and filtering
    pub candidates: usize,
    /// Records not yet in history
    pub delta: usize,
    /// Records the sink accepted
    pub delivered: usize,
    /// Records that failed after retries
    pub failed: usize,
}

/// The harvest engine
pub struct HarvestPipeline {
    settings: PipelineSettings,
    pool: Arc<ProxyPool>,
    history: Mutex<DedupHistory>,
    counter: Arc<Counter>,
    source_http: RelayHttpClient,
    sink_http: RelayHttpClient,
    retry: RetryPolicy,
    limiter: Semaphore,
}

impl HarvestPipeline {
    /// Build a pipeline from configuration around a shared pool and counter
    pub fn new(
        config: &Config,
        pool: Arc<ProxyPool>,
        counter: Arc<Counter>,
    ) -> Result<Self, RelayError> {
        let timeout = Duration::from_secs(config.http.timeout_secs);
        Ok(Self::with_parts(
            PipelineSettings::from_config(config),
            pool,
            counter,
            RelayHttpClient::new(timeout, config.source.accept_invalid_certs)?,
            RelayHttpClient::new(timeout, false)?,
            RetryPolicy::from_config(&config.retry),
        ))
    }

    pub fn with_parts(
        settings: PipelineSettings,
        pool: Arc<ProxyPool>,
        counter: Arc<Counter>,
        source_http: RelayHttpClient,
        sink_http: RelayHttpClient,
        retry: RetryPolicy,
    ) -> Self {
        let limiter = Semaphore::new(settings.max_concurrent.max(1));
        Self {
            settings,
            pool,
            history: Mutex::new(DedupHistory::new()),
            counter,
            source_http,
            sink_http,
            retry,
            limiter,
        }
    }

    /// Run one full cycle
    pub async fn run(&self) -> HarvestReport {
        let mut report = HarvestReport::default();

        let pages = self.fetch_pages(&mut report).await;

        let candidates = normalize_pages(&pages, Utc::now(), self.settings.retention);
        report.candidates = candidates.len();

        let delta = self.history.lock().await.diff(&candidates);
        report.delta = delta.len();
        debug!(
            candidates = report.candidates,
            delta = report.delta,
            "Computed delta against history"
        );

        let delivered = self.forward_all(&delta, &mut report).await;

        {
            let mut history = self.history.lock().await;
            let pruned = history.prune(self.settings.retention, Utc::now());
            history.merge(&delivered);
            debug!(pruned, history_size = history.len(), "History updated");
        }

        info!(
            pages_ok = report.pages_ok,
            pages_failed = report.pages_failed,
            candidates = report.candidates,
            delivered = report.delivered,
            failed = report.failed,
            "Harvest cycle finished"
        );
        report
    }

    /// Number of identities currently remembered
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    async fn fetch_pages(&self, report: &mut HarvestReport) -> Vec<Vec<Value>> {
        let started = Instant::now();
        let offsets = self.settings.page_offsets();

        let results = join_all(offsets.iter().map(|&offset| self.fetch_page(offset))).await;

        let mut pages = Vec::with_capacity(results.len());
        for (offset, result) in offsets.iter().zip(results) {
            match result {
                Ok(items) => {
                    report.items += items.len();
                    pages.push(items);
                }
                Err(err) => {
                    warn!(offset, error = %err, "Dropping page after retries");
                    report.pages_failed += 1;
                }
            }
        }
        report.pages_ok = pages.len();

        self.counter
            .add_timed("fetch.records", report.items as u64, started.elapsed())
            .await;
        if report.pages_failed > 0 {
            self.counter
                .add_count("fetch.pages_failed", report.pages_failed as u64)
                .await;
        }

        pages
    }

    async fn fetch_page(&self, offset: u64) -> Result<Vec<Value>, RelayError> {
        self.retry.execute(|| self.fetch_page_once(offset)).await
    }

    /// One attempt, drawing a fresh proxy; no proxy means a direct request
    async fn fetch_page_once(&self, offset: u64) -> Result<Vec<Value>, RelayError> {
        let proxy = self.pool.pick().await;

        let result: Result<SourcePage, RelayError> = self
            .source_http
            .get_json(
                proxy.as_ref(),
                &self.settings.source_url,
                &[("offset", offset.to_string())],
            )
            .await;

        match result {
            Ok(page) => Ok(page.result.data_list),
            Err(err) => {
                if let Some(proxy) = proxy.as_ref() {
                    if self.settings.evict_on_failure && err.is_transport() {
                        self.pool.evict(&proxy.endpoint()).await;
                    }
                }
                Err(err)
            }
        }
    }

    async fn forward_all(
        &self,
        delta: &HashSet<GroupRecord>,
        report: &mut HarvestReport,
    ) -> Vec<GroupRecord> {
        let started = Instant::now();

        let results = join_all(delta.iter().map(|record| async move {
            let result = self.retry.execute(|| self.forward(record)).await;
            (record, result)
        }))
        .await;

        let mut delivered = Vec::with_capacity(results.len());
        for (record, result) in results {
            match result {
                Ok(()) => delivered.push(record.clone()),
                Err(err) => {
                    warn!(link_id = record.link_id, error = %err, "Delivery failed");
                    report.failed += 1;
                }
            }
        }
        report.delivered = delivered.len();

        self.counter
            .add_timed("forward.batch", delta.len() as u64, started.elapsed())
            .await;
        self.counter
            .add_count("forward.success", report.delivered as u64)
            .await;
        self.counter
            .add_count("forward.failed", report.failed as u64)
            .await;

        delivered
    }

    /// Post one record to the sink and validate the application status
    async fn forward(&self, record: &GroupRecord) -> Result<(), RelayError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| RelayError::Network("delivery limiter closed".to_string()))?;

        let form = record.to_sink_form(&self.settings.source_tag);
        let reply: SinkReply = self.sink_http.post_form(&self.settings.sink_url, &form).await?;

        if reply.is_success() {
            Ok(())
        } else {
            Err(RelayError::Rejected {
                status: reply.status,
                msg: reply.msg,
            })
        }
    }
}

/// Build the candidate set from raw pages
///
/// Items that are malformed, have empty content or tag, or were created at or
/// before `now - retention` are discarded. Records sharing a link id collapse.
pub fn normalize_pages(
    pages: &[Vec<Value>],
    now: DateTime<Utc>,
    retention: chrono::Duration,
) -> HashSet<GroupRecord> {
    let cutoff = now - retention;
    pages
        .iter()
        .flatten()
        .filter_map(GroupRecord::from_value)
        .filter(|record| record.created_at > cutoff)
        .collect()
}

#[async_trait]
impl PeriodicTask for HarvestPipeline {
    fn name(&self) -> &str {
        "harvest"
    }

    fn interval(&self) -> Duration {
        self.settings.interval
    }

    async fn run_cycle(&self) -> Result<CycleReport, RelayError> {
        let report = self.run().await;
        Ok(CycleReport {
            processed: report.delivered as u64,
            failed: report.failed as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(link_id: u64, text: &str, tag: &str, created: DateTime<Utc>) -> Value {
        json!({
            "link_id": link_id,
            "create_at": created.timestamp(),
            "team_data": {"team_text": text, "name": {"value": tag}},
            "user": {"userid": link_id * 10}
        })
    }

    #[test]
    fn test_page_offsets() {
        let mut settings = PipelineSettings::from_config(&Config::default());
        settings.page_size = 30;
        settings.page_count = 3;
        assert_eq!(settings.page_offsets(), vec![0, 30, 60]);

        settings.page_count = 0;
        assert!(settings.page_offsets().is_empty());
    }

    #[test]
    fn test_normalize_filters_and_collapses() {
        let now = Utc::now();
        let retention = chrono::Duration::minutes(30);
        let pages = vec![
            vec![
                item(1, "raid tonight", "/j A#1", now),
                item(2, "", "B#2", now),
                item(3, "old post", "C#3", now - chrono::Duration::hours(1)),
            ],
            vec![
                item(1, "raid tonight (dup)", "A#1", now),
                item(4, "dungeon", "D#4", now),
                json!({"unexpected": true}),
            ],
        ];

        let candidates = normalize_pages(&pages, now, retention);

        let mut ids: Vec<u64> = candidates.iter().map(|r| r.link_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.source.url = "http://source/teams".to_string();
        config.sink.url = "http://sink/push".to_string();
        config.proxy.evict_on_failure = true;

        let settings = PipelineSettings::from_config(&config);

        assert_eq!(settings.source_url, "http://source/teams");
        assert_eq!(settings.sink_url, "http://sink/push");
        assert_eq!(settings.source_tag, "3");
        assert_eq!(settings.retention, chrono::Duration::minutes(30));
        assert_eq!(settings.max_concurrent, 40);
        assert!(settings.evict_on_failure);
    }
}
