//! Proxy-related domain models
//!
//! This module defines the pooled proxy record and the provider payload it is
//! built from.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::lenient;
use crate::error::RelayError;

/// A forward proxy endpoint with a bounded lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    /// Proxy host or IP address
    pub host: String,

    /// Proxy port
    pub port: String,

    /// When the record was fetched from the provider
    pub created_at: DateTime<Utc>,

    /// Instant from which the record must no longer be handed out
    pub expires_at: DateTime<Utc>,
}

impl ProxyRecord {
    /// Build a record whose expiry is `lifetime - margin` after `created_at`
    ///
    /// The expiry never precedes the creation time, so a proxy reported with
    /// a lifetime shorter than the margin is born expired. An expiry past the
    /// representable range saturates.
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        created_at: DateTime<Utc>,
        lifetime: Duration,
        margin: Duration,
    ) -> Self {
        let expires_at = created_at
            .checked_add_signed(lifetime)
            .and_then(|end| end.checked_sub_signed(margin))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .max(created_at);
        Self {
            host: host.into(),
            port: port.into(),
            created_at,
            expires_at,
        }
    }

    /// Check whether the record is unusable at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// `host:port` identity of the endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Proxy URL suitable for `reqwest::Proxy::all`
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// One proxy entry as reported by the provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderEntry {
    #[serde(alias = "IP")]
    pub ip: String,

    #[serde(alias = "Port", deserialize_with = "lenient::string")]
    pub port: String,

    /// Remaining lifetime in minutes
    #[serde(default, deserialize_with = "lenient::opt_uint")]
    pub during: Option<u64>,
}

impl ProviderEntry {
    /// Convert into a pooled record created at `now`
    ///
    /// `default_lifetime` applies when the provider omitted `during`. Returns
    /// `None` when the reported lifetime does not fit a timestamp.
    pub fn into_record(
        self,
        now: DateTime<Utc>,
        default_lifetime: Duration,
        margin: Duration,
    ) -> Option<ProxyRecord> {
        let lifetime = match self.during {
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(Duration::try_seconds)?,
            None => default_lifetime,
        };
        now.checked_add_signed(lifetime)?;
        Some(ProxyRecord::new(self.ip, self.port, now, lifetime, margin))
    }

    /// `host:port` the entry describes
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Provider response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub code: Option<Value>,

    #[serde(default)]
    pub msg: Option<String>,

    #[serde(default)]
    pub data: Value,
}

impl ProviderResponse {
    /// Extract the proxy entries, failing when `data` is not a list
    pub fn into_entries(self) -> Result<Vec<ProviderEntry>, RelayError> {
        match self.data {
            Value::Array(_) => serde_json::from_value(self.data)
                .map_err(|e| RelayError::InvalidData(format!("provider entry: {}", e))),
            _ => Err(RelayError::InvalidData(format!(
                "provider returned no proxy list (code {}, msg {})",
                self.code.map(|c| c.to_string()).unwrap_or_default(),
                self.msg.unwrap_or_default()
            ))),
        }
    }
}
