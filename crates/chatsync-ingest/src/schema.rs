//! Record types shared by the sync engine and the stores.
//!
//! - `Channel`: a tracked chat channel and its access state
//! - `TrackingRow`: one synced document of a channel
//! - `ConnectorConfig`: per-connector bot identities
//! - `Document` / `Folder`: what ends up in the searchable store

use serde::{Deserialize, Serialize};

/// Access granted to a channel by the workspace operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    None,
    Read,
    ReadWrite,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::Read => "read",
            PermissionLevel::ReadWrite => "read_write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(PermissionLevel::None),
            "read" => Some(PermissionLevel::Read),
            "read_write" => Some(PermissionLevel::ReadWrite),
            _ => None,
        }
    }

    /// Whether messages of the channel may be ingested.
    pub fn can_read(&self) -> bool {
        matches!(self, PermissionLevel::Read | PermissionLevel::ReadWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// A channel tracked for a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub name: String,
    pub permission: PermissionLevel,
    pub visibility: Visibility,
    /// `None` means the channel is active.
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl Channel {
    /// Readable and not skipped.
    pub fn is_syncable(&self) -> bool {
        self.permission.can_read() && self.skip_reason.is_none()
    }
}

/// Durable record of one synced document.
///
/// At most one row exists per (connector, channel, document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRow {
    pub connector_id: String,
    pub channel_id: String,
    pub document_id: String,
    /// Thread timestamp, only set on thread rows.
    #[serde(default)]
    pub message_ts: Option<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

/// Connector-level settings read by every sync unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub connector_id: String,
    /// The connector's own bot user; its thread replies are never ingested.
    #[serde(default)]
    pub bot_user_id: Option<String>,
    /// Bots whose messages are ingested like user messages.
    #[serde(default)]
    pub whitelisted_bot_ids: Vec<String>,
}

impl ConnectorConfig {
    pub fn is_bot_allowed(&self, bot_id: &str) -> bool {
        self.whitelisted_bot_ids.iter().any(|id| id == bot_id)
    }
}

/// One message rendered into a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Platform timestamp of the message, unique within a channel.
    pub message_ts: String,
    pub prefix: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub sections: Vec<DocumentSection>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub parent_id: String,
    pub mime_type: String,
}

impl Document {
    /// Plain-text body indexed for search.
    pub fn body(&self) -> String {
        let mut body = String::new();
        for section in &self.sections {
            body.push_str(&section.prefix);
            body.push(' ');
            body.push_str(&section.content);
            body.push('\n');
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub folder_id: String,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Backfill of history.
    Batch,
    /// Live update of a recent message.
    Incremental,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Batch => "batch",
            SyncType::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertContext {
    pub sync_type: SyncType,
}

impl UpsertContext {
    pub fn new(is_batch_sync: bool) -> Self {
        let sync_type = if is_batch_sync {
            SyncType::Batch
        } else {
            SyncType::Incremental
        };
        Self { sync_type }
    }
}
