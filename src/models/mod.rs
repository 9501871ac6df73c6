//! Domain models for fireteam-relay
//!
//! This module contains the records that flow between the proxy provider,
//! the source API and the sink API, together with their wire payloads.

pub mod group;
pub mod proxy;

// Re-export commonly used types
pub use group::{GroupRecord, SinkForm, SinkReply, SourceItem, SourcePage};
pub use proxy::{ProviderEntry, ProviderResponse, ProxyRecord};

/// Lenient deserializers for upstream payloads that mix numbers and strings
pub(crate) mod lenient {
    use serde::{de, Deserialize, Deserializer};
    use serde_json::Value;

    fn describe(value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }

    /// Accept `"8080"` or `8080` as a string
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(de::Error::custom(format!(
                "expected string or number, got {}",
                describe(&other)
            ))),
        }
    }

    /// Accept `"42"`, `42` or `42.0` as an unsigned integer
    pub fn uint<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        value_to_u64(&value)
            .ok_or_else(|| de::Error::custom(format!("expected integer, got {}", describe(&value))))
    }

    /// Like [`uint`] but absent or null values map to `None`
    pub fn opt_uint<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value_to_u64(&value).map(Some).ok_or_else(|| {
                de::Error::custom(format!("expected integer, got {}", describe(&value)))
            }),
        }
    }

    /// Accept Unix seconds as integer, float or numeric string
    pub fn timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let parsed = match &value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
            _ => None,
        };
        parsed.ok_or_else(|| de::Error::custom(format!("expected timestamp, got {}", describe(&value))))
    }

    fn value_to_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
