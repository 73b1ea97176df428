//! Garbage collection of channels the connector may no longer sync.
//!
//! A channel leaves the data source when the bot can no longer see it
//! remotely, or when it is still tracked locally but lost read permission
//! or was marked skipped. Only channels gone from the remote list also
//! leave the tracking store.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chatsync_ingest::Channel;

use crate::error::{PlatformErrorKind, SyncResult};
use crate::identity::{channel_folder_id, parse_document_id, DocumentRef};
use crate::SyncEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbageCollectionPlan {
    /// Channels whose documents must be deleted.
    pub channels_to_delete_from_data_source: Vec<String>,
    /// Channels whose tracking state must be deleted. Always a subset of the
    /// data-source list.
    pub channels_to_delete_from_connectors_db: Vec<String>,
}

pub fn plan_garbage_collection(
    remote: &HashSet<String>,
    tracked: &[Channel],
    document_channel_ids: &[String],
) -> GarbageCollectionPlan {
    let flagged: HashSet<&str> = tracked
        .iter()
        .filter(|c| !c.is_syncable())
        .map(|c| c.channel_id.as_str())
        .collect();

    let from_connectors_db: BTreeSet<String> = tracked
        .iter()
        .filter(|c| !remote.contains(&c.channel_id))
        .map(|c| c.channel_id.clone())
        .collect();

    let mut from_data_source: BTreeSet<String> = document_channel_ids
        .iter()
        .filter(|id| !remote.contains(*id) || flagged.contains(id.as_str()))
        .cloned()
        .collect();
    from_data_source.extend(from_connectors_db.iter().cloned());

    GarbageCollectionPlan {
        channels_to_delete_from_data_source: from_data_source.into_iter().collect(),
        channels_to_delete_from_connectors_db: from_connectors_db.into_iter().collect(),
    }
}

impl SyncEngine {
    pub async fn get_channels_to_garbage_collect(
        &self,
        connector_id: &str,
    ) -> SyncResult<GarbageCollectionPlan> {
        self.connector(connector_id).await?;

        let mut remote = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self.platform.list_channels(cursor.as_deref()).await?;
            pages += 1;
            remote.extend(
                page.channels
                    .into_iter()
                    .filter(|c| c.is_member && !c.is_archived)
                    .map(|c| c.id),
            );
            self.tick(pages, "listing remote channels");
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let tracked = self.tracking.channels(connector_id).await?;
        let with_documents = self.tracking.document_channel_ids(connector_id).await?;
        let plan = plan_garbage_collection(&remote, &tracked, &with_documents);

        info!(
            connector_id,
            remote = remote.len(),
            tracked = tracked.len(),
            from_data_source = plan.channels_to_delete_from_data_source.len(),
            from_connectors_db = plan.channels_to_delete_from_connectors_db.len(),
            "garbage collection planned"
        );
        Ok(plan)
    }

    /// Delete every document of a channel, then its folder.
    ///
    /// Each document is deleted from the target store before its tracking
    /// row, so a crash leaves at worst a row pointing at a deleted document
    /// and never a document nothing refers to.
    pub async fn delete_channel(&self, channel_id: &str, connector_id: &str) -> SyncResult<()> {
        let batch_size = self.config.gc_batch_size.max(1);
        let mut deleted = 0usize;
        let mut threads = 0usize;
        let mut buckets = 0usize;

        loop {
            let rows = self
                .tracking
                .rows_page(connector_id, channel_id, batch_size)
                .await?;
            if rows.is_empty() {
                break;
            }

            let mut document_ids = Vec::with_capacity(rows.len());
            for row in rows {
                self.target
                    .delete_document(connector_id, &row.document_id)
                    .await?;
                match parse_document_id(&row.document_id) {
                    Some(DocumentRef::Thread { .. }) => threads += 1,
                    Some(DocumentRef::Messages { .. }) => buckets += 1,
                    _ => warn!(document_id = %row.document_id, "unrecognized document id"),
                }
                document_ids.push(row.document_id);
                deleted += 1;
                self.tick(deleted, "deleting channel documents");
            }

            self.tracking
                .destroy_rows(connector_id, channel_id, &document_ids)
                .await?;
            self.heartbeat.beat("deleted a batch of channel documents");
        }

        self.target
            .delete_folder(connector_id, &channel_folder_id(channel_id))
            .await?;
        info!(connector_id, channel_id, deleted, threads, buckets, "channel documents deleted");
        Ok(())
    }

    /// Drop tracking state for channels the platform no longer shows.
    pub async fn delete_channels_from_connector_db(
        &self,
        channel_ids: &[String],
        connector_id: &str,
    ) -> SyncResult<()> {
        for channel_id in channel_ids {
            self.tracking.delete_channel(connector_id, channel_id).await?;
        }
        info!(connector_id, count = channel_ids.len(), "channels removed from tracking store");
        Ok(())
    }

    /// Join a channel. Returns `false` when the channel is archived.
    pub async fn attempt_channel_join(
        &self,
        channel_id: &str,
        connector_id: &str,
    ) -> SyncResult<bool> {
        self.connector(connector_id).await?;
        match self.platform.join(channel_id).await {
            Ok(()) => {
                info!(connector_id, channel_id, "joined channel");
                Ok(true)
            }
            Err(err) if err.kind == PlatformErrorKind::IsArchived => {
                info!(connector_id, channel_id, "channel is archived, not joining");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
