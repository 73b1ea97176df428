#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use chatsync_core::identity::ts_sort_key;
use chatsync_core::providers::{ChannelListPage, PlatformUser, UsersPage};
use chatsync_core::{
    Channel, ChatPlatform, ConnectorConfig, Heartbeat, HistoryPage, HistoryQuery, IngestionEngine,
    Message, PermissionLevel, PlatformError, PlatformErrorKind, RemoteChannel, SyncConfig,
    SyncEngine, Visibility,
};

pub const CONNECTOR: &str = "conn-1";
pub const CHANNEL: &str = "C100";
pub const BOT_USER: &str = "UBOT";

// 2024-01-03 (Wednesday) 12:00:00 UTC
pub const WEDNESDAY_S: i64 = 1_704_283_200;
// 2024-01-01 (Monday) 00:00:00 UTC
pub const MONDAY_MS: i64 = 1_704_067_200_000;

pub fn ts(secs: i64) -> String {
    format!("{}.000000", secs)
}

pub fn msg(secs: i64, user: &str, text: &str) -> Message {
    Message {
        ts: ts(secs),
        user: Some(user.to_string()),
        text: Some(text.to_string()),
        ..Default::default()
    }
}

pub fn threaded(secs: i64, thread_secs: i64, user: &str, text: &str) -> Message {
    Message {
        thread_ts: Some(ts(thread_secs)),
        ..msg(secs, user, text)
    }
}

/// Scripted chat platform.
///
/// History is served newest-first in pages of `query.limit`, with the
/// offset of the next page as cursor.
#[derive(Default)]
pub struct FakePlatform {
    channels: Mutex<HashMap<String, RemoteChannel>>,
    history: Mutex<HashMap<String, Vec<Message>>>,
    replies: Mutex<HashMap<(String, String), Vec<Message>>>,
    users: Mutex<Vec<PlatformUser>>,
    history_error: Mutex<Option<PlatformErrorKind>>,
    pub history_calls: AtomicUsize,
    pub replies_calls: AtomicUsize,
}

impl FakePlatform {
    pub fn add_channel(&self, id: &str, name: &str, is_member: bool, is_archived: bool) {
        self.channels.lock().unwrap().insert(
            id.to_string(),
            RemoteChannel {
                id: id.to_string(),
                name: name.to_string(),
                is_private: false,
                is_archived,
                is_member,
            },
        );
    }

    pub fn remove_channel(&self, id: &str) {
        self.channels.lock().unwrap().remove(id);
    }

    pub fn set_history(&self, channel_id: &str, messages: Vec<Message>) {
        self.history
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), messages);
    }

    pub fn set_replies(&self, channel_id: &str, thread_secs: i64, messages: Vec<Message>) {
        self.replies
            .lock()
            .unwrap()
            .insert((channel_id.to_string(), ts(thread_secs)), messages);
    }

    pub fn set_users(&self, users: Vec<PlatformUser>) {
        *self.users.lock().unwrap() = users;
    }

    pub fn fail_history(&self, kind: Option<PlatformErrorKind>) {
        *self.history_error.lock().unwrap() = kind;
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

fn offset_of(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|c| c.strip_prefix("offset:"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn paginate(items: Vec<Message>, cursor: Option<&str>, limit: usize) -> HistoryPage {
    let offset = offset_of(cursor);
    let end = (offset + limit.max(1)).min(items.len());
    let messages = items.get(offset..end).map(<[Message]>::to_vec).unwrap_or_default();
    let has_more = end < items.len();
    HistoryPage {
        messages,
        next_cursor: has_more.then(|| format!("offset:{}", end)),
        has_more,
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn history(&self, query: &HistoryQuery) -> Result<HistoryPage, PlatformError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.history_error.lock().unwrap().clone() {
            return Err(PlatformError::new(kind, "conversations.history"));
        }

        let mut items: Vec<Message> = self
            .history
            .lock()
            .unwrap()
            .get(&query.channel_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| {
                let key = ts_sort_key(&m.ts);
                query.oldest.as_deref().map_or(true, |o| key >= ts_sort_key(o))
                    && query.latest.as_deref().map_or(true, |l| key <= ts_sort_key(l))
            })
            .collect();
        items.sort_by_key(|m| std::cmp::Reverse(ts_sort_key(&m.ts)));
        Ok(paginate(items, query.cursor.as_deref(), query.limit))
    }

    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError> {
        self.replies_calls.fetch_add(1, Ordering::SeqCst);
        let mut items = self
            .replies
            .lock()
            .unwrap()
            .get(&(channel_id.to_string(), thread_ts.to_string()))
            .cloned()
            .ok_or_else(|| {
                PlatformError::new(PlatformErrorKind::ThreadNotFound, "conversations.replies")
            })?;
        items.sort_by_key(|m| ts_sort_key(&m.ts));
        Ok(paginate(items, cursor, limit))
    }

    async fn permalink(&self, channel_id: &str, ts: &str) -> Result<String, PlatformError> {
        Ok(format!(
            "https://example.slack.com/archives/{}/p{}",
            channel_id,
            ts.replace('.', "")
        ))
    }

    async fn channel_info(&self, channel_id: &str) -> Result<Option<RemoteChannel>, PlatformError> {
        Ok(self.channels.lock().unwrap().get(channel_id).cloned())
    }

    async fn list_channels(&self, _cursor: Option<&str>) -> Result<ChannelListPage, PlatformError> {
        let mut channels: Vec<RemoteChannel> =
            self.channels.lock().unwrap().values().cloned().collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ChannelListPage {
            channels,
            next_cursor: None,
        })
    }

    async fn users_list(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<UsersPage, PlatformError> {
        let users = self.users.lock().unwrap().clone();
        let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (offset + limit.max(1)).min(users.len());
        Ok(UsersPage {
            users: users.get(offset..end).map(<[PlatformUser]>::to_vec).unwrap_or_default(),
            next_cursor: (end < users.len()).then(|| end.to_string()),
        })
    }

    async fn join(&self, channel_id: &str) -> Result<(), PlatformError> {
        let mut channels = self.channels.lock().unwrap();
        match channels.get_mut(channel_id) {
            Some(channel) if channel.is_archived => Err(PlatformError::new(
                PlatformErrorKind::IsArchived,
                "conversations.join",
            )),
            Some(channel) => {
                channel.is_member = true;
                Ok(())
            }
            None => Err(PlatformError::new(
                PlatformErrorKind::ChannelNotFound,
                "conversations.join",
            )),
        }
    }
}

#[derive(Default)]
pub struct CountingHeartbeat {
    beats: AtomicUsize,
}

impl CountingHeartbeat {
    pub fn beats(&self) -> usize {
        self.beats.load(Ordering::SeqCst)
    }
}

impl Heartbeat for CountingHeartbeat {
    fn beat(&self, _details: &str) {
        self.beats.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub engine: SyncEngine,
    pub ingest: IngestionEngine,
    pub platform: Arc<FakePlatform>,
    pub heartbeat: Arc<CountingHeartbeat>,
}

pub fn tracked_channel(id: &str, name: &str, permission: PermissionLevel) -> Channel {
    Channel {
        channel_id: id.to_string(),
        name: name.to_string(),
        permission,
        visibility: Visibility::Public,
        skip_reason: None,
    }
}

/// Engine over an in-memory store with one connector and one readable
/// channel `#general` that the bot is a member of.
pub async fn harness(config: SyncConfig) -> Harness {
    let ingest = IngestionEngine::in_memory().await.unwrap();
    ingest
        .upsert_connector(&ConnectorConfig {
            connector_id: CONNECTOR.to_string(),
            bot_user_id: Some(BOT_USER.to_string()),
            whitelisted_bot_ids: vec!["BHELPER".to_string()],
        })
        .await
        .unwrap();
    ingest
        .upsert_channel(CONNECTOR, &tracked_channel(CHANNEL, "general", PermissionLevel::Read))
        .await
        .unwrap();

    let platform = Arc::new(FakePlatform::default());
    platform.add_channel(CHANNEL, "general", true, false);

    let heartbeat = Arc::new(CountingHeartbeat::default());
    let engine =
        SyncEngine::with_ingest(platform.clone(), ingest.clone(), heartbeat.clone(), config);
    Harness {
        engine,
        ingest,
        platform,
        heartbeat,
    }
}
