//! Tracing initialisation for fireteam-relay
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and either a
//! JSON or a human-readable formatting layer. `RUST_LOG` directives take
//! precedence over the configured level. Statistics are logged on the
//! [`STATS_TARGET`] target so they can be routed apart from engine logs.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target used for periodic statistics events
pub const STATS_TARGET: &str = "stats";

/// Logging error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoggingError {
    /// A global subscriber was already installed
    #[error("Failed to initialize tracing: {0}")]
    Init(String),

    /// Unknown output format
    #[error("Unsupported log format: {0}")]
    Format(String),
}

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(format: &str) -> Result<Self, LoggingError> {
        match format.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(LoggingError::Format(other.to_string())),
        }
    }
}

/// Map a configured level name, falling back to `INFO`
pub fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Event filter from `RUST_LOG`, or the configured level when unset or invalid
pub fn build_filter(log_level: &str) -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), log_level)
}

fn filter_from(directives: Option<&str>, log_level: &str) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| {
            EnvFilter::default()
                .add_directive(LevelFilter::from_level(parse_level(log_level)).into())
        })
}

/// Initialize the global tracing subscriber
pub fn init_tracing(log_level: &str, format: &str) -> Result<(), LoggingError> {
    let filter = build_filter(log_level);

    match LogFormat::parse(format)? {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string())),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string())),
    }
}
