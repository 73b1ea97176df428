//! Non-threaded message sync for one week bucket.
//!
//! A chunk pages through `[start_ts_ms, end_ts_ms]` of a channel's history
//! and writes everything it collected to the bucket document. When the
//! page-fetch budget runs out first, it flushes what it has and hands back
//! the platform cursor; the next invocation resumes from there and merges
//! into the same document, since the document id depends only on the week.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use chatsync_ingest::{Document, TrackingRow, UpsertContext};

use crate::error::{PlatformErrorKind, SyncResult};
use crate::format::{
    bucket_title, document_tags, merge_sections, sections_from_messages, MESSAGES_MIME_TYPE,
};
use crate::identity::{
    bucket_document_id, channel_folder_id, ms_to_latest_ts, ms_to_ts, ts_to_ms, TimeBucket,
};
use crate::providers::{HistoryQuery, Message};
use crate::SyncEngine;

fn default_batch() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub channel_id: String,
    pub connector_id: String,
    /// Fetch window, inclusive on both ends.
    pub start_ts_ms: i64,
    pub end_ts_ms: i64,
    /// Week the chunk belongs to; defaults to the week containing `start_ts_ms`.
    #[serde(default)]
    pub week_start_ts_ms: Option<i64>,
    #[serde(default)]
    pub week_end_ts_ms: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
    /// Keep paging past the per-invocation fetch budget.
    #[serde(default)]
    pub ignore_message_limit: bool,
    #[serde(default)]
    pub max_total_messages: Option<usize>,
    #[serde(default = "default_batch")]
    pub is_batch_sync: bool,
}

impl ChunkRequest {
    /// A request covering a whole week bucket.
    pub fn for_bucket(channel_id: &str, connector_id: &str, bucket: TimeBucket) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            connector_id: connector_id.to_string(),
            start_ts_ms: bucket.start_ms,
            end_ts_ms: bucket.end_ms - 1,
            week_start_ts_ms: Some(bucket.start_ms),
            week_end_ts_ms: Some(bucket.end_ms),
            cursor: None,
            ignore_message_limit: false,
            max_total_messages: None,
            is_batch_sync: true,
        }
    }

    pub fn bucket(&self) -> TimeBucket {
        match (self.week_start_ts_ms, self.week_end_ts_ms) {
            (Some(start_ms), Some(end_ms)) => TimeBucket { start_ms, end_ms },
            _ => TimeBucket::containing(self.start_ts_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub completed: bool,
    pub next_cursor: Option<String>,
    pub messages_processed: usize,
}

impl ChunkOutcome {
    fn done(messages_processed: usize) -> Self {
        Self {
            completed: true,
            next_cursor: None,
            messages_processed,
        }
    }
}

impl SyncEngine {
    pub async fn sync_non_threaded_chunk(&self, request: ChunkRequest) -> SyncResult<ChunkOutcome> {
        let channel_id = request.channel_id.as_str();
        let connector_id = request.connector_id.as_str();
        let connector = self.connector(connector_id).await?;
        let channel = self.tracked_channel(connector_id, channel_id).await?;
        if !channel.is_syncable() {
            info!(connector_id, channel_id, "channel not syncable, skipping chunk");
            return Ok(ChunkOutcome::done(0));
        }

        let bucket = request.bucket();
        let budget = self.config.chunk_api_call_budget.max(1);
        let cap = request
            .max_total_messages
            .unwrap_or(self.config.max_total_messages)
            .max(1);

        // Newest-first across pages.
        let mut collected: Vec<Message> = Vec::new();
        let mut cursor = request.cursor.clone();
        let mut calls = 0usize;
        let mut outcome_cursor = None;

        loop {
            let query = HistoryQuery {
                channel_id: channel_id.to_string(),
                cursor: cursor.clone(),
                oldest: Some(ms_to_ts(request.start_ts_ms)),
                latest: Some(ms_to_latest_ts(request.end_ts_ms)),
                limit: self.config.history_page_size,
            };
            let page = match self.platform.history(&query).await {
                Ok(page) => page,
                Err(err) if err.kind == PlatformErrorKind::NotInChannel => {
                    info!(connector_id, channel_id, "bot is not in channel, skipping chunk");
                    return Ok(ChunkOutcome::done(0));
                }
                Err(err) => return Err(err.into()),
            };
            calls += 1;
            self.tick(calls, "syncing non-threaded messages");

            collected.extend(
                page.messages
                    .into_iter()
                    .filter(|m| m.thread_ts.is_none() && m.is_eligible(&connector)),
            );

            if collected.len() > cap {
                warn!(
                    connector_id,
                    channel_id,
                    bucket = bucket.key(),
                    collected = collected.len(),
                    cap,
                    "too many messages in bucket, keeping the newest"
                );
                collected.truncate(cap);
                break;
            }

            let next = if page.has_more { page.next_cursor } else { None };
            match next {
                None => break,
                Some(next) => {
                    if !request.ignore_message_limit && calls >= budget {
                        debug!(connector_id, channel_id, calls, "fetch budget reached, yielding");
                        outcome_cursor = Some(next);
                        break;
                    }
                    cursor = Some(next);
                }
            }
        }

        let processed = collected.len();
        if processed > 0 {
            self.flush_bucket(&request, &channel.name, bucket, &collected, cap)
                .await?;
        }

        Ok(ChunkOutcome {
            completed: outcome_cursor.is_none(),
            next_cursor: outcome_cursor,
            messages_processed: processed,
        })
    }

    async fn flush_bucket(
        &self,
        request: &ChunkRequest,
        channel_name: &str,
        bucket: TimeBucket,
        messages: &[Message],
        cap: usize,
    ) -> SyncResult<()> {
        let channel_id = request.channel_id.as_str();
        let connector_id = request.connector_id.as_str();
        let document_id = bucket_document_id(channel_id, &bucket);

        let mut sections = {
            let names = self.users.read().await;
            sections_from_messages(messages, &names)
        };

        let mut source_url = None;
        if request.cursor.is_some() {
            if let Some(existing) = self.target.get_document(connector_id, &document_id).await? {
                sections = merge_sections(existing.sections, sections);
                source_url = existing.source_url;
            }
        }
        if sections.len() > cap {
            let excess = sections.len() - cap;
            sections.drain(..excess);
        }

        let Some(first) = sections.first() else {
            return Ok(());
        };
        if source_url.is_none() {
            source_url = self.resolve_permalink(channel_id, &first.message_ts).await;
        }
        let created_at = ts_to_ms(&first.message_ts);
        let updated_at = sections.last().and_then(|s| ts_to_ms(&s.message_ts));

        if self
            .tracking
            .find_row(connector_id, channel_id, &document_id)
            .await?
            .is_none()
        {
            self.tracking
                .create_row(&TrackingRow {
                    connector_id: connector_id.to_string(),
                    channel_id: channel_id.to_string(),
                    document_id: document_id.clone(),
                    message_ts: None,
                    skip_reason: None,
                })
                .await?;
        }

        let title = bucket_title(channel_name, &bucket);
        let doc = Document {
            document_id: document_id.clone(),
            tags: document_tags(channel_id, channel_name, created_at, &title),
            title,
            sections,
            source_url,
            timestamp_ms: updated_at,
            parent_id: channel_folder_id(channel_id),
            mime_type: MESSAGES_MIME_TYPE.to_string(),
        };
        self.target
            .upsert_document(connector_id, &doc, UpsertContext::new(request.is_batch_sync))
            .await?;

        info!(
            connector_id,
            channel_id,
            document_id = %document_id,
            sections = doc.sections.len(),
            "bucket document upserted"
        );
        Ok(())
    }
}
