//! Store capabilities consumed by the engine.
//!
//! `TargetStore` is the searchable document store; `TrackingStore` holds
//! connector settings, tracked channels and one row per synced document.
//! Both are implemented for `IngestionEngine`.

use anyhow::Result;
use async_trait::async_trait;

use chatsync_ingest::{
    Channel, ConnectorConfig, Document, Folder, IngestionEngine, TrackingRow, UpsertContext,
};

/// Upsert and delete by stable id within a connector. Both must be
/// idempotent, and one connector's writes never touch another's documents.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn upsert_document(
        &self,
        connector_id: &str,
        doc: &Document,
        context: UpsertContext,
    ) -> Result<()>;
    async fn get_document(&self, connector_id: &str, document_id: &str)
        -> Result<Option<Document>>;
    async fn delete_document(&self, connector_id: &str, document_id: &str) -> Result<()>;
    async fn upsert_folder(&self, connector_id: &str, folder: &Folder) -> Result<()>;
    async fn delete_folder(&self, connector_id: &str, folder_id: &str) -> Result<()>;
}

/// Rows are keyed by (connector, channel, document).
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn connector(&self, connector_id: &str) -> Result<Option<ConnectorConfig>>;
    async fn channel(&self, connector_id: &str, channel_id: &str) -> Result<Option<Channel>>;
    async fn channels(&self, connector_id: &str) -> Result<Vec<Channel>>;
    async fn upsert_channel(&self, connector_id: &str, channel: &Channel) -> Result<()>;
    async fn delete_channel(&self, connector_id: &str, channel_id: &str) -> Result<()>;

    async fn find_row(
        &self,
        connector_id: &str,
        channel_id: &str,
        document_id: &str,
    ) -> Result<Option<TrackingRow>>;
    async fn create_row(&self, row: &TrackingRow) -> Result<()>;
    async fn update_row(&self, row: &TrackingRow) -> Result<()>;
    async fn rows_page(
        &self,
        connector_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<TrackingRow>>;
    async fn destroy_rows(
        &self,
        connector_id: &str,
        channel_id: &str,
        document_ids: &[String],
    ) -> Result<()>;
    /// Channels owning at least one tracked document.
    async fn document_channel_ids(&self, connector_id: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl TargetStore for IngestionEngine {
    async fn upsert_document(
        &self,
        connector_id: &str,
        doc: &Document,
        context: UpsertContext,
    ) -> Result<()> {
        IngestionEngine::upsert_document(self, connector_id, doc, context).await?;
        Ok(())
    }

    async fn get_document(
        &self,
        connector_id: &str,
        document_id: &str,
    ) -> Result<Option<Document>> {
        IngestionEngine::get_document(self, connector_id, document_id).await
    }

    async fn delete_document(&self, connector_id: &str, document_id: &str) -> Result<()> {
        IngestionEngine::delete_document(self, connector_id, document_id).await
    }

    async fn upsert_folder(&self, connector_id: &str, folder: &Folder) -> Result<()> {
        IngestionEngine::upsert_folder(self, connector_id, folder).await
    }

    async fn delete_folder(&self, connector_id: &str, folder_id: &str) -> Result<()> {
        IngestionEngine::delete_folder(self, connector_id, folder_id).await
    }
}

#[async_trait]
impl TrackingStore for IngestionEngine {
    async fn connector(&self, connector_id: &str) -> Result<Option<ConnectorConfig>> {
        self.get_connector(connector_id).await
    }

    async fn channel(&self, connector_id: &str, channel_id: &str) -> Result<Option<Channel>> {
        self.get_channel(connector_id, channel_id).await
    }

    async fn channels(&self, connector_id: &str) -> Result<Vec<Channel>> {
        self.list_channels(connector_id).await
    }

    async fn upsert_channel(&self, connector_id: &str, channel: &Channel) -> Result<()> {
        IngestionEngine::upsert_channel(self, connector_id, channel).await
    }

    async fn delete_channel(&self, connector_id: &str, channel_id: &str) -> Result<()> {
        IngestionEngine::delete_channel(self, connector_id, channel_id).await
    }

    async fn find_row(
        &self,
        connector_id: &str,
        channel_id: &str,
        document_id: &str,
    ) -> Result<Option<TrackingRow>> {
        IngestionEngine::find_row(self, connector_id, channel_id, document_id).await
    }

    async fn create_row(&self, row: &TrackingRow) -> Result<()> {
        IngestionEngine::create_row(self, row).await
    }

    async fn update_row(&self, row: &TrackingRow) -> Result<()> {
        IngestionEngine::update_row(self, row).await
    }

    async fn rows_page(
        &self,
        connector_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<TrackingRow>> {
        IngestionEngine::rows_page(self, connector_id, channel_id, limit).await
    }

    async fn destroy_rows(
        &self,
        connector_id: &str,
        channel_id: &str,
        document_ids: &[String],
    ) -> Result<()> {
        IngestionEngine::destroy_rows(self, connector_id, channel_id, document_ids).await?;
        Ok(())
    }

    async fn document_channel_ids(&self, connector_id: &str) -> Result<Vec<String>> {
        IngestionEngine::document_channel_ids(self, connector_id).await
    }
}
