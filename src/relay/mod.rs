//! Harvest and relay engines
//!
//! # Components
//!
//! - [`retry`]: Fixed-delay retry policy wrapped around every outbound unit of work
//! - [`http_client`]: HTTP client that routes a request through an optional proxy
//! - [`proxy_pool`]: Pool of expiring proxies refreshed from the provider
//! - [`history`]: Time-bounded record of identities already delivered
//! - [`pipeline`]: Fetch, dedup and forward cycle
//! - [`scheduler`]: Periodic driver for the engines with panic isolation
//! - [`supervisor`]: Restarts the scheduler when its loops terminate
//!
//! # Example
//!
//! ```ignore
//! use fireteam_relay::relay::{HarvestPipeline, ProxyPool, RelayHttpClient};
//!
//! let pool = Arc::new(ProxyPool::new(&config.proxy, RelayHttpClient::new(timeout, false)?));
//! let pipeline = HarvestPipeline::new(&config, Arc::clone(&pool), counter)?;
//!
//! pool.refresh().await?;
//! let report = pipeline.run().await;
//! ```

pub mod history;
pub mod http_client;
pub mod pipeline;
pub mod proxy_pool;
pub mod retry;
pub mod scheduler;
pub mod supervisor;

pub use history::DedupHistory;
pub use http_client::RelayHttpClient;
pub use pipeline::{normalize_pages, HarvestPipeline, HarvestReport, PipelineSettings};
pub use proxy_pool::ProxyPool;
pub use retry::RetryPolicy;
pub use scheduler::{
    CycleOutcome, CycleReport, CycleStatus, PeriodicTask, Scheduler, SchedulerExit,
};
pub use supervisor::Supervisor;
