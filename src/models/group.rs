//! Team-up post models
//!
//! This module defines the harvested [`GroupRecord`], the source payload it is
//! normalised from, and the form/reply exchanged with the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};

use super::lenient;

/// A harvested team-up post
///
/// Identity is the provider-assigned link id: equality and hashing both use
/// it alone, so records that differ only in content collapse in sets.
#[derive(Debug, Clone)]
pub struct GroupRecord {
    /// Provider-assigned link identifier
    pub link_id: u64,

    /// Post text with newlines removed
    pub content: String,

    /// Effective display tag (any `/j` prefix stripped)
    pub tag: String,

    /// Origin user identifier
    pub user_id: String,

    /// Creation time reported by the source
    pub created_at: DateTime<Utc>,
}

impl PartialEq for GroupRecord {
    fn eq(&self, other: &Self) -> bool {
        self.link_id == other.link_id
    }
}

impl Eq for GroupRecord {}

impl Hash for GroupRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.link_id.hash(state);
    }
}

impl GroupRecord {
    /// Normalise a raw source item
    ///
    /// Returns `None` when the item is malformed or its content or tag is
    /// empty after normalisation.
    pub fn from_value(value: &Value) -> Option<Self> {
        let item: SourceItem = serde_json::from_value(value.clone()).ok()?;
        Self::from_item(item)
    }

    /// Normalise a decoded source item, see [`GroupRecord::from_value`]
    pub fn from_item(item: SourceItem) -> Option<Self> {
        let content = item.team_data.team_text.replace(['\r', '\n'], "");
        let tag = effective_tag(&item.team_data.name.value).to_string();
        if content.trim().is_empty() || tag.is_empty() {
            return None;
        }

        let created_at = DateTime::<Utc>::from_timestamp(item.create_at, 0)?;

        Some(Self {
            link_id: item.link_id,
            content,
            tag,
            user_id: item.user.userid,
            created_at,
        })
    }

    /// Encode into the sink's form fields
    pub fn to_sink_form(&self, source_tag: &str) -> SinkForm {
        SinkForm {
            name: self.tag.clone(),
            context: self.content.clone(),
            source: source_tag.to_string(),
            repeatid: self.user_id.clone(),
        }
    }
}

/// Strip an optional `/j <id>` prefix from a display tag
fn effective_tag(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("/j") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => trimmed,
    }
}

/// One page of the source listing
#[derive(Debug, Clone, Deserialize)]
pub struct SourcePage {
    pub result: SourceResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceResult {
    /// Raw items; decoded one by one so a malformed item only drops itself
    #[serde(default)]
    pub data_list: Vec<Value>,
}

/// Raw team-up item as served by the source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceItem {
    #[serde(alias = "linkid", deserialize_with = "lenient::uint")]
    pub link_id: u64,

    /// Unix seconds, UTC
    #[serde(deserialize_with = "lenient::timestamp")]
    pub create_at: i64,

    #[serde(default)]
    pub team_data: TeamData,

    #[serde(default)]
    pub user: UserRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamData {
    #[serde(default)]
    pub team_text: String,

    #[serde(default)]
    pub name: TagValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagValue {
    #[serde(default, deserialize_with = "lenient::string")]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRef {
    #[serde(default, deserialize_with = "lenient::string")]
    pub userid: String,
}

/// Form fields posted to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkForm {
    pub name: String,
    pub context: String,
    pub source: String,
    pub repeatid: String,
}

/// Sink reply body
#[derive(Debug, Clone, Deserialize)]
pub struct SinkReply {
    pub status: i64,

    #[serde(default, deserialize_with = "lenient::string")]
    pub msg: String,
}

impl SinkReply {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}
