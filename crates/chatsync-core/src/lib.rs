use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

pub mod channel;
pub mod chunk;
pub mod config;
pub mod error;
pub mod format;
pub mod gc;
pub mod identity;
pub mod limiter;
pub mod progress;
pub mod providers;
pub mod store;
pub mod thread;
pub mod users;

pub use channel::{classify_page, ChannelSyncOutput, PageClassification};
pub use chunk::{ChunkOutcome, ChunkRequest};
pub use config::{SlackConfig, SyncConfig};
pub use error::{PlatformError, PlatformErrorKind, SyncError, SyncResult};
pub use gc::{plan_garbage_collection, GarbageCollectionPlan};
pub use identity::{parse_document_id, DocumentRef, TimeBucket};
pub use limiter::ConcurrencyLimiter;
pub use progress::{emit_progress, Heartbeat, NoopHeartbeat, ProgressHeartbeat};
pub use providers::{ChatPlatform, HistoryPage, HistoryQuery, Message, RemoteChannel, SlackClient};
pub use store::{TargetStore, TrackingStore};
pub use users::UserDirectory;

pub use chatsync_ingest::{
    Channel, ConnectorConfig, Document, Folder, IngestionEngine, PermissionLevel, TrackingRow,
    UpsertContext, Visibility,
};

#[derive(Debug, Clone)]
pub struct ServerPaths {
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub admin_socket_path: PathBuf, // admin.sock - activity host
}

impl ServerPaths {
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os("CHATSYNC_DATA_DIR") {
            return Self::from_base(PathBuf::from(dir));
        }
        if let Some(home) = std::env::var_os("HOME") {
            return Self::from_base(PathBuf::from(home).join(".chatsync"));
        }
        Self::from_base(PathBuf::from(".chatsync"))
    }

    pub fn from_base(base_dir: PathBuf) -> Self {
        let db_path = base_dir.join("chatsync.db");
        let config_path = base_dir.join("sync.toml");
        let admin_socket_path = base_dir.join("admin.sock");
        Self {
            base_dir,
            db_path,
            config_path,
            admin_socket_path,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

/// The synchronization engine.
///
/// Cheap to clone; every activity runs against a clone so pooled sync units
/// can own their engine handle.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) platform: Arc<dyn ChatPlatform>,
    pub(crate) tracking: Arc<dyn TrackingStore>,
    pub(crate) target: Arc<dyn TargetStore>,
    pub(crate) heartbeat: Arc<dyn Heartbeat>,
    pub(crate) users: UserDirectory,
    pub(crate) config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        tracking: Arc<dyn TrackingStore>,
        target: Arc<dyn TargetStore>,
        heartbeat: Arc<dyn Heartbeat>,
        config: SyncConfig,
    ) -> Self {
        Self {
            platform,
            tracking,
            target,
            heartbeat,
            users: UserDirectory::new(),
            config,
        }
    }

    /// Engine whose tracking and target stores share one database.
    pub fn with_ingest(
        platform: Arc<dyn ChatPlatform>,
        ingest: IngestionEngine,
        heartbeat: Arc<dyn Heartbeat>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(ingest);
        Self::new(platform, store.clone(), store, heartbeat, config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub(crate) async fn connector(&self, connector_id: &str) -> SyncResult<ConnectorConfig> {
        self.tracking
            .connector(connector_id)
            .await?
            .ok_or_else(|| SyncError::ConnectorNotFound(connector_id.to_string()))
    }

    pub(crate) async fn tracked_channel(
        &self,
        connector_id: &str,
        channel_id: &str,
    ) -> SyncResult<Channel> {
        self.tracking
            .channel(connector_id, channel_id)
            .await?
            .ok_or_else(|| SyncError::channel_not_found(connector_id, channel_id))
    }

    /// Best-effort; a document without a source URL is still stored.
    pub(crate) async fn resolve_permalink(&self, channel_id: &str, ts: &str) -> Option<String> {
        match self.platform.permalink(channel_id, ts).await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(channel_id, ts, error = %err, "permalink unavailable");
                None
            }
        }
    }

    /// Beat every `heartbeat_every` iterations of a long loop.
    pub(crate) fn tick(&self, iteration: usize, details: &str) {
        let every = self.config.heartbeat_every.max(1);
        if iteration > 0 && iteration % every == 0 {
            self.heartbeat.beat(details);
        }
    }
}
