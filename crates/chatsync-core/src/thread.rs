use tracing::{debug, info};

use chatsync_ingest::{Document, TrackingRow, UpsertContext};

use crate::error::{PlatformError, PlatformErrorKind, SyncResult};
use crate::format::{document_tags, sections_from_messages, thread_title, THREAD_MIME_TYPE};
use crate::identity::{channel_folder_id, thread_document_id, ts_to_ms};
use crate::limiter::ConcurrencyLimiter;
use crate::providers::Message;
use crate::SyncEngine;

impl SyncEngine {
    /// Sync one thread into its document.
    ///
    /// The channel's permission is read again here rather than trusted from
    /// the caller: an operator may revoke access while a backfill is running.
    /// A unit that slips through the window writes one stale thread.
    pub async fn sync_thread(
        &self,
        channel_id: &str,
        channel_name: &str,
        thread_ts: &str,
        connector_id: &str,
        is_batch_sync: bool,
    ) -> SyncResult<()> {
        let connector = self.connector(connector_id).await?;
        let channel = self.tracked_channel(connector_id, channel_id).await?;
        if !channel.is_syncable() {
            info!(connector_id, channel_id, thread_ts, "channel not syncable, skipping thread");
            return Ok(());
        }

        let replies = match self.fetch_replies(channel_id, thread_ts).await {
            Ok(replies) => replies,
            Err(err)
                if matches!(
                    err.kind,
                    PlatformErrorKind::ThreadNotFound | PlatformErrorKind::NotInChannel
                ) =>
            {
                info!(
                    connector_id,
                    channel_id,
                    thread_ts,
                    kind = %err.kind,
                    "thread unavailable, skipping"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let own_bot = connector.bot_user_id.as_deref();
        let messages: Vec<Message> = replies
            .into_iter()
            .filter(|m| m.is_eligible(&connector))
            .filter(|m| own_bot.is_none() || m.user.as_deref() != own_bot)
            .collect();
        if messages.is_empty() {
            debug!(connector_id, channel_id, thread_ts, "no messages left in thread");
            return Ok(());
        }

        let document_id = thread_document_id(channel_id, thread_ts);
        match self
            .tracking
            .find_row(connector_id, channel_id, &document_id)
            .await?
        {
            Some(row) if row.skip_reason.is_some() => {
                info!(
                    connector_id,
                    channel_id,
                    thread_ts,
                    skip_reason = row.skip_reason.as_deref().unwrap_or_default(),
                    "thread marked skipped"
                );
                return Ok(());
            }
            Some(mut row) => {
                row.message_ts = Some(thread_ts.to_string());
                self.tracking.update_row(&row).await?;
            }
            None => {
                self.tracking
                    .create_row(&TrackingRow {
                        connector_id: connector_id.to_string(),
                        channel_id: channel_id.to_string(),
                        document_id: document_id.clone(),
                        message_ts: Some(thread_ts.to_string()),
                        skip_reason: None,
                    })
                    .await?;
            }
        }

        let sections = {
            let names = self.users.read().await;
            sections_from_messages(&messages, &names)
        };
        let source_url = match sections.first() {
            Some(first) => self.resolve_permalink(channel_id, &first.message_ts).await,
            None => None,
        };

        let title = thread_title(channel_name, thread_ts);
        let doc = Document {
            document_id: document_id.clone(),
            tags: document_tags(channel_id, channel_name, ts_to_ms(thread_ts), &title),
            title,
            timestamp_ms: sections.last().and_then(|s| ts_to_ms(&s.message_ts)),
            sections,
            source_url,
            parent_id: channel_folder_id(channel_id),
            mime_type: THREAD_MIME_TYPE.to_string(),
        };
        self.target
            .upsert_document(connector_id, &doc, UpsertContext::new(is_batch_sync))
            .await?;

        info!(
            connector_id,
            channel_id,
            document_id = %document_id,
            messages = doc.sections.len(),
            "thread document upserted"
        );
        Ok(())
    }

    /// Sync many threads of one channel, bounded by the configured concurrency.
    pub async fn sync_threads(
        &self,
        channel_id: &str,
        channel_name: &str,
        thread_tss: &[String],
        connector_id: &str,
        is_batch_sync: bool,
    ) -> SyncResult<()> {
        let mut unique: Vec<String> = Vec::with_capacity(thread_tss.len());
        for ts in thread_tss {
            if !unique.contains(ts) {
                unique.push(ts.clone());
            }
        }

        let limiter = ConcurrencyLimiter::new(self.config.concurrency);
        let tasks: Vec<_> = unique
            .into_iter()
            .map(|thread_ts| {
                let engine = self.clone();
                let channel_id = channel_id.to_string();
                let channel_name = channel_name.to_string();
                let connector_id = connector_id.to_string();
                async move {
                    engine
                        .sync_thread(
                            &channel_id,
                            &channel_name,
                            &thread_ts,
                            &connector_id,
                            is_batch_sync,
                        )
                        .await
                }
            })
            .collect();

        let synced = limiter.run_all(tasks).await?.len();
        info!(connector_id, channel_id, synced, "threads synced");
        Ok(())
    }

    /// Every message of a thread, following reply cursors to the end.
    async fn fetch_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<Message>, PlatformError> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .platform
                .replies(channel_id, thread_ts, cursor.as_deref(), self.config.replies_page_size)
                .await?;
            pages += 1;
            messages.extend(page.messages);
            self.tick(pages, "fetching thread replies");

            match page.next_cursor.filter(|_| page.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(messages)
    }
}
