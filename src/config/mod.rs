//! Configuration management for fireteam-relay
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound for second-valued windows and lifetimes (ten years)
pub const MAX_SPAN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Proxy provider and pool configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Source API configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Sink API configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Harvest cycle configuration
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Outbound HTTP configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry configuration shared by every outbound call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Statistics emission configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix FIRETEAM_RELAY_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(url) = std::env::var("FIRETEAM_RELAY_PROXY_PROVIDER_URL") {
            config.proxy.provider_url = url;
        }
        if let Ok(url) = std::env::var("FIRETEAM_RELAY_SOURCE_URL") {
            config.source.url = url;
        }
        if let Ok(url) = std::env::var("FIRETEAM_RELAY_SINK_URL") {
            config.sink.url = url;
        }
        if let Ok(evict) = std::env::var("FIRETEAM_RELAY_PROXY_EVICT_ON_FAILURE") {
            config.proxy.evict_on_failure = evict.parse().unwrap_or(false);
        }
        if let Ok(interval) = std::env::var("FIRETEAM_RELAY_HARVEST_INTERVAL_SECS") {
            config.harvest.interval_secs = interval
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid harvest interval".to_string()))?;
        }
        if let Ok(max) = std::env::var("FIRETEAM_RELAY_HARVEST_MAX_CONCURRENT") {
            config.harvest.max_concurrent = max
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid concurrency cap".to_string()))?;
        }
        if let Ok(level) = std::env::var("FIRETEAM_RELAY_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Reject values that would make an engine loop meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required_urls = [
            ("proxy.provider_url", &self.proxy.provider_url),
            ("source.url", &self.source.url),
            ("sink.url", &self.sink.url),
        ];
        for (name, url) in required_urls {
            if url.trim().is_empty() {
                return Err(ConfigError::MissingRequired(name.to_string()));
            }
        }

        let spans = [
            ("proxy.expiry_margin_secs", self.proxy.expiry_margin_secs),
            ("proxy.default_lifetime_secs", self.proxy.default_lifetime_secs),
            ("harvest.retention_secs", self.harvest.retention_secs),
        ];
        for (name, value) in spans {
            if value > MAX_SPAN_SECS {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be <= {}",
                    name, MAX_SPAN_SECS
                )));
            }
        }

        let positive = [
            ("proxy.refresh_interval_secs", self.proxy.refresh_interval_secs),
            ("source.page_size", self.source.page_size as u64),
            ("source.page_count", self.source.page_count as u64),
            ("harvest.interval_secs", self.harvest.interval_secs),
            ("harvest.retention_secs", self.harvest.retention_secs),
            ("harvest.max_concurrent", self.harvest.max_concurrent as u64),
            ("http.timeout_secs", self.http.timeout_secs),
            ("retry.attempts", self.retry.attempts as u64),
            ("stats.interval_secs", self.stats.interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }
}

/// Proxy pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    /// Provider endpoint returning fresh proxies
    #[serde(default)]
    pub provider_url: String,

    /// Seconds between provider calls
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Safety margin subtracted from each proxy's reported lifetime
    #[serde(default = "default_expiry_margin")]
    pub expiry_margin_secs: u64,

    /// Lifetime assumed when the provider omits one
    #[serde(default = "default_lifetime")]
    pub default_lifetime_secs: u64,

    /// Drop a proxy from the pool as soon as a request through it fails
    #[serde(default)]
    pub evict_on_failure: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            provider_url: String::new(),
            refresh_interval_secs: default_refresh_interval(),
            expiry_margin_secs: default_expiry_margin(),
            default_lifetime_secs: default_lifetime(),
            evict_on_failure: false,
        }
    }
}

impl ProxyConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn default_lifetime(&self) -> chrono::Duration {
        bounded_span(self.default_lifetime_secs)
    }

    pub fn expiry_margin(&self) -> chrono::Duration {
        bounded_span(self.expiry_margin_secs)
    }
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_expiry_margin() -> u64 {
    10
}

fn default_lifetime() -> u64 {
    60
}

/// Source API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Listing endpoint; the `offset` query parameter is appended per page
    #[serde(default)]
    pub url: String,

    /// Items per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pages fetched concurrently per cycle
    #[serde(default = "default_page_count")]
    pub page_count: u32,

    /// Skip TLS verification on source requests (proxies often re-sign)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            page_size: default_page_size(),
            page_count: default_page_count(),
            accept_invalid_certs: false,
        }
    }
}

fn default_page_size() -> u32 {
    30
}

fn default_page_count() -> u32 {
    3
}

/// Sink API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SinkConfig {
    /// Ingestion endpoint
    #[serde(default)]
    pub url: String,

    /// Fixed `source` form field identifying this relay
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            source_tag: default_source_tag(),
        }
    }
}

fn default_source_tag() -> String {
    "3".to_string()
}

/// Harvest cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarvestConfig {
    /// Seconds between harvest cycles
    #[serde(default = "default_harvest_interval")]
    pub interval_secs: u64,

    /// Dedup history retention window in seconds
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Maximum in-flight sink deliveries
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_harvest_interval(),
            retention_secs: default_retention(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl HarvestConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        bounded_span(self.retention_secs)
    }
}

fn default_harvest_interval() -> u64 {
    10
}

fn default_retention() -> u64 {
    1800 // 30 minutes
}

fn default_max_concurrent() -> usize {
    40
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

/// Fixed-delay retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    500
}

/// Statistics emission configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsConfig {
    /// Seconds between statistics flushes
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval(),
        }
    }
}

fn default_stats_interval() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format, `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
/// Seconds as a `chrono::Duration`, clamped to [`MAX_SPAN_SECS`]
fn bounded_span(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_SPAN_SECS) as i64)
}

fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
