//! Per-channel sync driver.
//!
//! One call handles one page of channel history: classify it, sync the
//! threads and week buckets it touches, and hand the continuation cursor
//! back to the caller. The caller persists `ChannelSyncOutput` between
//! invocations; nothing here keeps per-channel state.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use chatsync_ingest::{ConnectorConfig, Visibility};

use crate::chunk::ChunkRequest;
use crate::error::{PlatformErrorKind, SyncError, SyncResult};
use crate::format::channel_folder;
use crate::identity::{ts_to_ms, TimeBucket};
use crate::limiter::ConcurrencyLimiter;
use crate::providers::{HistoryQuery, Message};
use crate::SyncEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSyncOutput {
    /// `None` once there is nothing further to page through.
    pub next_cursor: Option<String>,
    /// Week-start timestamps (ms) already synced during this run.
    pub weeks_synced: BTreeSet<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageClassification {
    /// Thread timestamps, in first-seen order.
    pub threads_to_sync: Vec<String>,
    pub unthreaded_timeframes_to_sync: Vec<TimeBucket>,
    /// Every message on the page lies below the low-water mark.
    pub all_skip: bool,
}

/// Sort one history page into thread and bucket work.
///
/// `from_ts` is the low-water mark in ms. A message is skipped when its
/// thread started before it, or when its whole week ended before it. Buckets
/// already in `weeks_synced` are not queued again but do not count as
/// skipped: a busy week can span several pages.
pub fn classify_page(
    messages: &[Message],
    connector: &ConnectorConfig,
    from_ts: Option<i64>,
    weeks_synced: &BTreeSet<i64>,
) -> PageClassification {
    let below = |ms: i64| from_ts.is_some_and(|from| ms < from);
    let mut out = PageClassification {
        all_skip: true,
        ..Default::default()
    };

    for message in messages {
        let Some(ts_ms) = message.ts_ms() else {
            warn!(ts = %message.ts, "unparseable message timestamp");
            continue;
        };

        if !message.is_eligible(connector) {
            if !below(ts_ms) {
                out.all_skip = false;
            }
            continue;
        }

        if let Some(thread_ts) = message.thread_ts.as_ref() {
            let thread_ms = ts_to_ms(thread_ts).unwrap_or(ts_ms);
            if below(thread_ms) {
                continue;
            }
            out.all_skip = false;
            if !out.threads_to_sync.contains(thread_ts) {
                out.threads_to_sync.push(thread_ts.clone());
            }
        } else {
            let bucket = TimeBucket::containing(ts_ms);
            if below(bucket.end_ms) {
                continue;
            }
            out.all_skip = false;
            if !weeks_synced.contains(&bucket.key())
                && !out.unthreaded_timeframes_to_sync.contains(&bucket)
            {
                out.unthreaded_timeframes_to_sync.push(bucket);
            }
        }
    }

    out
}

type UnitFuture = Pin<Box<dyn Future<Output = SyncResult<Option<i64>>> + Send>>;

impl SyncEngine {
    pub async fn sync_channel(
        &self,
        channel_id: &str,
        connector_id: &str,
        from_ts: Option<i64>,
        weeks_synced: BTreeSet<i64>,
        cursor: Option<String>,
    ) -> SyncResult<ChannelSyncOutput> {
        let connector = self.connector(connector_id).await?;
        let mut channel = self.tracked_channel(connector_id, channel_id).await?;
        let remote = self
            .platform
            .channel_info(channel_id)
            .await?
            .ok_or_else(|| SyncError::channel_not_found(connector_id, channel_id))?;

        let visibility = if remote.is_private {
            Visibility::Private
        } else {
            Visibility::Public
        };
        if channel.name != remote.name || channel.visibility != visibility {
            channel.name = remote.name.clone();
            channel.visibility = visibility;
            self.tracking.upsert_channel(connector_id, &channel).await?;
            debug!(connector_id, channel_id, name = %channel.name, "channel metadata refreshed");
        }

        if !channel.is_syncable() {
            info!(
                connector_id,
                channel_id,
                permission = channel.permission.as_str(),
                skip_reason = channel.skip_reason.as_deref().unwrap_or_default(),
                "channel not syncable, skipping"
            );
            return Ok(ChannelSyncOutput {
                next_cursor: None,
                weeks_synced,
            });
        }

        if cursor.is_none() {
            self.target
                .upsert_folder(connector_id, &channel_folder(&channel))
                .await?;
        }

        let query = HistoryQuery {
            channel_id: channel_id.to_string(),
            cursor,
            oldest: None,
            latest: None,
            limit: self.config.history_page_size,
        };
        let page = match self.platform.history(&query).await {
            Ok(page) => page,
            Err(err) if err.kind == PlatformErrorKind::NotInChannel => {
                info!(connector_id, channel_id, "bot is not in channel, skipping");
                return Ok(ChannelSyncOutput {
                    next_cursor: None,
                    weeks_synced,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let plan = classify_page(&page.messages, &connector, from_ts, &weeks_synced);
        info!(
            connector_id,
            channel_id,
            messages = page.messages.len(),
            threads = plan.threads_to_sync.len(),
            buckets = plan.unthreaded_timeframes_to_sync.len(),
            all_skip = plan.all_skip,
            "history page classified"
        );

        let mut units: Vec<UnitFuture> = Vec::new();
        for thread_ts in plan.threads_to_sync {
            let engine = self.clone();
            let channel_id = channel_id.to_string();
            let channel_name = channel.name.clone();
            let connector_id = connector_id.to_string();
            units.push(Box::pin(async move {
                engine
                    .sync_thread(&channel_id, &channel_name, &thread_ts, &connector_id, true)
                    .await?;
                Ok::<_, SyncError>(None)
            }));
        }
        for bucket in plan.unthreaded_timeframes_to_sync {
            let engine = self.clone();
            let request = ChunkRequest::for_bucket(channel_id, connector_id, bucket);
            units.push(Box::pin(async move {
                engine.sync_bucket(request).await?;
                Ok::<_, SyncError>(Some(bucket.key()))
            }));
        }

        let limiter = ConcurrencyLimiter::new(self.config.concurrency);
        let mut weeks_synced = weeks_synced;
        for week in limiter.run_all(units).await?.into_iter().flatten() {
            weeks_synced.insert(week);
        }

        let next_cursor = if plan.all_skip { None } else { page.next_cursor };
        Ok(ChannelSyncOutput {
            next_cursor,
            weeks_synced,
        })
    }

    /// Run chunk invocations for one bucket until it completes.
    async fn sync_bucket(&self, mut request: ChunkRequest) -> SyncResult<usize> {
        let mut processed = 0usize;
        loop {
            let outcome = self.sync_non_threaded_chunk(request.clone()).await?;
            processed += outcome.messages_processed;
            match outcome.next_cursor {
                Some(next) if !outcome.completed => {
                    self.heartbeat.beat("syncing week bucket");
                    request.cursor = Some(next);
                }
                _ => break,
            }
        }
        Ok(processed)
    }
}
