//! Slack Web API adapter.
//!
//! Implements `ChatPlatform` over `conversations.*`, `chat.getPermalink` and
//! `users.list`. Slack reports failures as `{"ok": false, "error": "<code>"}`
//! with HTTP 200; those codes are mapped to `PlatformErrorKind` here.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::SlackConfig;
use crate::error::{PlatformError, PlatformErrorKind};

use super::{
    call_with_backoff, ChannelListPage, ChatPlatform, HistoryPage, HistoryQuery, Message,
    PlatformUser, RemoteChannel, UsersPage,
};

pub struct SlackClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl SlackClient {
    pub fn new(
        http: reqwest::Client,
        api_base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self> {
        let mut base_url = Url::parse(api_base_url)
            .map_err(|err| anyhow!("invalid Slack API base URL '{}': {}", api_base_url, err))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// Build a client from config, reading the token from `config.token_env`.
    pub fn from_config(http: reqwest::Client, config: &SlackConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow!("missing Slack token: set {}", config.token_env))?;
        Self::new(http, &config.api_base_url, token)
    }

    fn endpoint(&self, method: &str) -> Result<Url, PlatformError> {
        self.base_url.join(method).map_err(|err| {
            PlatformError::new(
                PlatformErrorKind::Other("invalid_url".to_string()),
                format!("{}: {}", method, err),
            )
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let url = self.endpoint(method)?;
        debug!(method, "slack call");
        let response = call_with_backoff("slack", || {
            self.http
                .get(url.clone())
                .bearer_auth(&self.token)
                .query(params)
        })
        .await?;

        let payload: serde_json::Value = response.json().await.map_err(|err| {
            PlatformError::transient(format!("{}: unreadable response: {}", method, err))
        })?;
        parse_payload(method, payload)
    }
}

fn parse_payload<T: DeserializeOwned>(
    method: &str,
    payload: serde_json::Value,
) -> Result<T, PlatformError> {
    let ok = payload.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    if !ok {
        let code = payload
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error");
        return Err(PlatformError::new(error_kind(code), format!("{} failed: {}", method, code)));
    }
    serde_json::from_value(payload)
        .map_err(|err| {
            PlatformError::transient(format!("{}: unexpected response: {}", method, err))
        })
}

/// Classify a Slack error code.
fn error_kind(code: &str) -> PlatformErrorKind {
    match code {
        "not_in_channel" => PlatformErrorKind::NotInChannel,
        "thread_not_found" => PlatformErrorKind::ThreadNotFound,
        "channel_not_found" => PlatformErrorKind::ChannelNotFound,
        "is_archived" => PlatformErrorKind::IsArchived,
        "ratelimited" | "rate_limited" => PlatformErrorKind::RateLimited,
        "internal_error" | "fatal_error" | "service_unavailable" | "request_timeout" => {
            PlatformErrorKind::Transient
        }
        other => PlatformErrorKind::Other(other.to_string()),
    }
}

fn next_cursor(meta: Option<SlackResponseMetadata>) -> Option<String> {
    meta.and_then(|m| m.next_cursor).filter(|c| !c.is_empty())
}

#[async_trait]
impl ChatPlatform for SlackClient {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn history(&self, query: &HistoryQuery) -> Result<HistoryPage, PlatformError> {
        let mut params = vec![
            ("channel", query.channel_id.clone()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(c) = query.cursor.as_ref() {
            params.push(("cursor", c.clone()));
        }
        if let Some(oldest) = query.oldest.as_ref() {
            params.push(("oldest", oldest.clone()));
        }
        if let Some(latest) = query.latest.as_ref() {
            params.push(("latest", latest.clone()));
        }
        if query.oldest.is_some() || query.latest.is_some() {
            params.push(("inclusive", "true".to_string()));
        }

        let payload: SlackHistoryResponse = self.call("conversations.history", &params).await?;
        payload.into_page("conversations.history")
    }

    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let payload: SlackHistoryResponse = self.call("conversations.replies", &params).await?;
        payload.into_page("conversations.replies")
    }

    async fn permalink(&self, channel_id: &str, ts: &str) -> Result<String, PlatformError> {
        let params = [
            ("channel", channel_id.to_string()),
            ("message_ts", ts.to_string()),
        ];
        let payload: SlackPermalinkResponse = self.call("chat.getPermalink", &params).await?;
        Ok(payload.permalink)
    }

    async fn channel_info(&self, channel_id: &str) -> Result<Option<RemoteChannel>, PlatformError> {
        let params = [("channel", channel_id.to_string())];
        match self.call::<SlackChannelInfoResponse>("conversations.info", &params).await {
            Ok(payload) => Ok(Some(payload.channel.into())),
            Err(err) if err.kind == PlatformErrorKind::ChannelNotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list_channels(&self, cursor: Option<&str>) -> Result<ChannelListPage, PlatformError> {
        let mut params = vec![
            ("limit", "200".to_string()),
            ("types", "public_channel,private_channel".to_string()),
            ("exclude_archived", "true".to_string()),
        ];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let payload: SlackChannelsResponse = self.call("conversations.list", &params).await?;
        Ok(ChannelListPage {
            channels: payload.channels.into_iter().map(Into::into).collect(),
            next_cursor: next_cursor(payload.response_metadata),
        })
    }

    async fn users_list(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<UsersPage, PlatformError> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let payload: SlackUsersResponse = self.call("users.list", &params).await?;
        Ok(UsersPage {
            users: payload
                .members
                .into_iter()
                .map(|member| PlatformUser {
                    id: member.id,
                    real_name: member.profile.real_name,
                    display_name: member.profile.display_name,
                })
                .collect(),
            next_cursor: next_cursor(payload.response_metadata),
        })
    }

    async fn join(&self, channel_id: &str) -> Result<(), PlatformError> {
        let params = [("channel", channel_id.to_string())];
        let _: SlackJoinResponse = self.call("conversations.join", &params).await?;
        Ok(())
    }
}

// --- Slack API Response Types ---

#[derive(Debug, Clone, Deserialize)]
struct SlackResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackHistoryResponse {
    messages: Option<Vec<SlackMessage>>,
    #[serde(default)]
    has_more: bool,
    response_metadata: Option<SlackResponseMetadata>,
}

impl SlackHistoryResponse {
    fn into_page(self, method: &str) -> Result<HistoryPage, PlatformError> {
        let messages = self
            .messages
            .ok_or_else(|| {
                PlatformError::transient(format!("{}: response without messages", method))
            })?;
        Ok(HistoryPage {
            messages: messages.into_iter().map(Into::into).collect(),
            next_cursor: next_cursor(self.response_metadata),
            has_more: self.has_more,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessage {
    ts: String,
    user: Option<String>,
    bot_id: Option<String>,
    text: Option<String>,
    thread_ts: Option<String>,
}

impl From<SlackMessage> for Message {
    fn from(m: SlackMessage) -> Self {
        Message {
            ts: m.ts,
            user: m.user,
            bot_id: m.bot_id,
            text: m.text,
            thread_ts: m.thread_ts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackPermalinkResponse {
    permalink: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChannel {
    id: String,
    name: Option<String>,
    name_normalized: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    is_member: bool,
}

impl From<SlackChannel> for RemoteChannel {
    fn from(c: SlackChannel) -> Self {
        RemoteChannel {
            name: c.name.or(c.name_normalized).unwrap_or_else(|| c.id.clone()),
            id: c.id,
            is_private: c.is_private,
            is_archived: c.is_archived,
            is_member: c.is_member,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChannelInfoResponse {
    channel: SlackChannel,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChannelsResponse {
    #[serde(default)]
    channels: Vec<SlackChannel>,
    response_metadata: Option<SlackResponseMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackJoinResponse {
    #[allow(dead_code)]
    channel: Option<SlackChannel>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackUsersResponse {
    #[serde(default)]
    members: Vec<SlackUser>,
    response_metadata: Option<SlackResponseMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    profile: SlackUserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SlackUserProfile {
    real_name: Option<String>,
    display_name: Option<String>,
}
