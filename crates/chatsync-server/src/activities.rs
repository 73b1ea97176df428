//! Activity dispatch for the host connection.
//!
//! One JSON object per line in each direction:
//! `{"id", "activity", "params"}` in, `{"id", "ok", "result"?, "error"?, "retryable"?}` out.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use chatsync_core::{Channel, ChunkRequest, ConnectorConfig, IngestionEngine, SyncEngine, SyncError};

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub id: Option<String>,
    pub activity: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ActivityResponse {
    pub id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ActivityResponse {
    pub fn success(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
            retryable: None,
        }
    }

    pub fn failure(id: Option<String>, error: String, retryable: bool) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
            retryable: Some(retryable),
        }
    }
}

#[derive(Debug, Error)]
enum ActivityError {
    #[error("unknown activity: {0}")]
    UnknownActivity(String),
    #[error("invalid params: {0}")]
    InvalidParams(#[from] serde_json::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ActivityError {
    fn is_retryable(&self) -> bool {
        match self {
            ActivityError::UnknownActivity(_) | ActivityError::InvalidParams(_) => false,
            ActivityError::Sync(err) => err.is_retryable(),
            ActivityError::Store(_) => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncChannelParams {
    channel_id: String,
    connector_id: String,
    #[serde(default)]
    from_ts: Option<i64>,
    #[serde(default)]
    weeks_synced: BTreeSet<i64>,
    #[serde(default)]
    cursor: Option<String>,
}

fn default_batch() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SyncThreadParams {
    channel_id: String,
    channel_name: String,
    thread_ts: String,
    connector_id: String,
    #[serde(default = "default_batch")]
    is_batch_sync: bool,
}

#[derive(Debug, Deserialize)]
struct SyncThreadsParams {
    channel_id: String,
    channel_name: String,
    thread_tss: Vec<String>,
    connector_id: String,
    #[serde(default = "default_batch")]
    is_batch_sync: bool,
}

#[derive(Debug, Deserialize)]
struct ConnectorParams {
    connector_id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelParams {
    channel_id: String,
    connector_id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelsParams {
    channel_ids: Vec<String>,
    connector_id: String,
}

#[derive(Debug, Deserialize)]
struct UpsertChannelParams {
    connector_id: String,
    #[serde(flatten)]
    channel: Channel,
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T, ActivityError> {
    Ok(serde_json::from_value(value)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ActivityError> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Clone)]
pub struct ActivityHandler {
    engine: SyncEngine,
    ingest: IngestionEngine,
}

impl ActivityHandler {
    pub fn new(engine: SyncEngine, ingest: IngestionEngine) -> Self {
        Self { engine, ingest }
    }

    pub async fn handle(&self, request: ActivityRequest) -> ActivityResponse {
        let id = request.id.clone();
        let activity = request.activity.clone();
        match self.dispatch(&activity, request.params).await {
            Ok(result) => ActivityResponse::success(id, result),
            Err(err) => {
                let retryable = err.is_retryable();
                warn!(activity = %activity, retryable, "activity failed: {}", err);
                ActivityResponse::failure(id, err.to_string(), retryable)
            }
        }
    }

    async fn dispatch(&self, activity: &str, raw: Value) -> Result<Value, ActivityError> {
        match activity {
            "ping" => Ok(serde_json::json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),
            "sync_channel" => {
                let p: SyncChannelParams = params(raw)?;
                let out = self
                    .engine
                    .sync_channel(
                        &p.channel_id,
                        &p.connector_id,
                        p.from_ts,
                        p.weeks_synced,
                        p.cursor,
                    )
                    .await?;
                encode(&out)
            }
            "sync_non_threaded_chunk" => {
                let request: ChunkRequest = params(raw)?;
                let outcome = self.engine.sync_non_threaded_chunk(request).await?;
                encode(&outcome)
            }
            "sync_thread" => {
                let p: SyncThreadParams = params(raw)?;
                self.engine
                    .sync_thread(
                        &p.channel_id,
                        &p.channel_name,
                        &p.thread_ts,
                        &p.connector_id,
                        p.is_batch_sync,
                    )
                    .await?;
                Ok(Value::Null)
            }
            "sync_threads" => {
                let p: SyncThreadsParams = params(raw)?;
                self.engine
                    .sync_threads(
                        &p.channel_id,
                        &p.channel_name,
                        &p.thread_tss,
                        &p.connector_id,
                        p.is_batch_sync,
                    )
                    .await?;
                Ok(Value::Null)
            }
            "fetch_users" => {
                let p: ConnectorParams = params(raw)?;
                let count = self.engine.fetch_users(&p.connector_id).await?;
                Ok(serde_json::json!({"users": count}))
            }
            "get_channels_to_garbage_collect" => {
                let p: ConnectorParams = params(raw)?;
                let plan = self
                    .engine
                    .get_channels_to_garbage_collect(&p.connector_id)
                    .await?;
                encode(&plan)
            }
            "delete_channel" => {
                let p: ChannelParams = params(raw)?;
                self.engine.delete_channel(&p.channel_id, &p.connector_id).await?;
                Ok(Value::Null)
            }
            "delete_channels_from_connector_db" => {
                let p: ChannelsParams = params(raw)?;
                self.engine
                    .delete_channels_from_connector_db(&p.channel_ids, &p.connector_id)
                    .await?;
                Ok(Value::Null)
            }
            "attempt_channel_join" => {
                let p: ChannelParams = params(raw)?;
                let joined = self
                    .engine
                    .attempt_channel_join(&p.channel_id, &p.connector_id)
                    .await?;
                Ok(Value::Bool(joined))
            }
            "upsert_connector" => {
                let config: ConnectorConfig = params(raw)?;
                self.ingest.upsert_connector(&config).await?;
                info!(connector_id = %config.connector_id, "connector saved");
                Ok(Value::Null)
            }
            "upsert_channel" => {
                let p: UpsertChannelParams = params(raw)?;
                self.ingest.upsert_channel(&p.connector_id, &p.channel).await?;
                info!(
                    connector_id = %p.connector_id,
                    channel_id = %p.channel.channel_id,
                    "channel saved"
                );
                Ok(Value::Null)
            }
            other => Err(ActivityError::UnknownActivity(other.to_string())),
        }
    }
}
