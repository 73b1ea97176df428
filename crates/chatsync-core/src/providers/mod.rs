//! Chat platform capability consumed by the sync engine.
//!
//! This module provides:
//! - `ChatPlatform` trait implemented by platform adapters
//! - the message/page types the engine works with
//! - `call_with_backoff` for adapters talking HTTP
//!
//! Adapters classify platform failures into `PlatformErrorKind`; the engine
//! only ever matches on kinds.

mod slack;

pub use slack::SlackClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chatsync_ingest::ConnectorConfig;

use crate::error::{PlatformError, PlatformErrorKind};
use crate::identity::ts_to_ms;

/// A channel message as returned by history and replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl Message {
    pub fn ts_ms(&self) -> Option<i64> {
        ts_to_ms(&self.ts)
    }

    /// User-authored, or authored by an allow-listed bot.
    pub fn is_eligible(&self, connector: &ConnectorConfig) -> bool {
        self.user.is_some()
            || self
                .bot_id
                .as_deref()
                .is_some_and(|bot_id| connector.is_bot_allowed(bot_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub channel_id: String,
    pub cursor: Option<String>,
    /// Lower bound, platform timestamp, inclusive.
    pub oldest: Option<String>,
    /// Upper bound, platform timestamp, inclusive.
    pub latest: Option<String>,
    pub limit: usize,
}

/// One page of messages.
///
/// History pages are ordered newest-first; reply pages oldest-first.
/// Channel pagination stops early on a page made only of already-covered
/// messages, which is only sound under that ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChannel {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub is_archived: bool,
    /// Whether the connector's bot is a member.
    pub is_member: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelListPage {
    pub channels: Vec<RemoteChannel>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    pub id: String,
    pub real_name: Option<String>,
    pub display_name: Option<String>,
}

impl PlatformUser {
    pub fn best_name(&self) -> String {
        self.real_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.display_name.clone().filter(|n| !n.is_empty()))
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersPage {
    pub users: Vec<PlatformUser>,
    pub next_cursor: Option<String>,
}

/// Capabilities the engine needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Platform identifier (e.g., "slack").
    fn name(&self) -> &'static str;

    /// One page of channel history, newest-first.
    async fn history(&self, query: &HistoryQuery) -> Result<HistoryPage, PlatformError>;

    /// One page of a thread, parent first, then replies oldest-first.
    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError>;

    async fn permalink(&self, channel_id: &str, ts: &str) -> Result<String, PlatformError>;

    /// `None` when the platform does not know the channel.
    async fn channel_info(&self, channel_id: &str) -> Result<Option<RemoteChannel>, PlatformError>;

    async fn list_channels(&self, cursor: Option<&str>) -> Result<ChannelListPage, PlatformError>;

    async fn users_list(&self, cursor: Option<&str>, limit: usize)
        -> Result<UsersPage, PlatformError>;

    async fn join(&self, channel_id: &str) -> Result<(), PlatformError>;
}

/// HTTP request helper with exponential backoff for rate limiting.
pub async fn call_with_backoff<F>(
    provider: &str,
    mut builder_fn: F,
) -> Result<reqwest::Response, PlatformError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    use std::time::Duration;
    use tokio::time::sleep;

    let mut retries = 0;
    let mut delay = Duration::from_secs(1);
    let max_retries = 8;

    loop {
        let response = builder_fn()
            .send()
            .await
            .map_err(|err| {
                PlatformError::transient(format!("{}: request failed: {}", provider, err))
            })?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            if retries >= max_retries {
                return Err(PlatformError::new(
                    PlatformErrorKind::RateLimited,
                    format!("{}: rate limited after {} retries", provider, retries),
                ));
            }

            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(delay);

            tracing::warn!("{}: Rate limited, waiting {:?}", provider, wait);
            sleep(wait).await;

            retries += 1;
            delay = std::cmp::min(delay * 2, Duration::from_secs(60));
            continue;
        }

        if status.is_server_error() {
            if retries < 3 {
                tracing::warn!("{}: Server error {}, retrying...", provider, status);
                sleep(delay).await;
                retries += 1;
                delay *= 2;
                continue;
            }
            return Err(PlatformError::transient(format!(
                "{}: HTTP {} after {} retries",
                provider, status, retries
            )));
        }

        return Err(PlatformError::new(
            PlatformErrorKind::Other(format!("http_{}", status.as_u16())),
            format!(
                "{}: HTTP {} - {}",
                provider,
                status,
                response.text().await.unwrap_or_default()
            ),
        ));
    }
}
