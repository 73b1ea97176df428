//! SQLite-backed storage for synced chat content.
//!
//! One database holds both sides of the pipeline:
//! - the searchable document store (documents, folders, full-text index)
//! - the tracking tables (connectors, channels, per-document sync rows)

pub mod schema;

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, SqlitePool};
use tracing::instrument;

pub use schema::{
    Channel, ConnectorConfig, Document, DocumentSection, Folder, PermissionLevel, SyncType,
    TrackingRow, UpsertContext, Visibility,
};

type DocumentRow = (
    String,
    String,
    String,
    Option<String>,
    Option<i64>,
    String,
    String,
    String,
);

type ChannelRow = (String, String, String, String, Option<String>);

#[derive(Clone)]
pub struct IngestionEngine {
    pool: SqlitePool,
}

impl IngestionEngine {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str("sqlite:")?
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let engine = Self { pool };
        engine.init_schema().await?;
        Ok(engine)
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let engine = Self { pool };
        engine.init_schema().await?;
        Ok(engine)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip_all)]
    async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                connector_id TEXT NOT NULL,\
                document_id TEXT NOT NULL,\
                title TEXT NOT NULL,\
                body TEXT NOT NULL,\
                sections TEXT NOT NULL,\
                source_url TEXT,\
                timestamp_ms INTEGER,\
                tags TEXT NOT NULL,\
                parent_id TEXT NOT NULL,\
                mime_type TEXT NOT NULL,\
                sync_type TEXT NOT NULL,\
                updated_at TEXT NOT NULL,\
                UNIQUE(connector_id, document_id)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(\
                document_id, title, body,\
                content='documents',\
                content_rowid='id'\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN\n\
                INSERT INTO documents_fts(rowid, document_id, title, body) VALUES (new.id, new.document_id, new.title, new.body);\n\
            END;",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN\n\
                INSERT INTO documents_fts(documents_fts, rowid, document_id, title, body) VALUES('delete', old.id, old.document_id, old.title, old.body);\n\
            END;",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN\n\
                INSERT INTO documents_fts(documents_fts, rowid, document_id, title, body) VALUES('delete', old.id, old.document_id, old.title, old.body);\n\
                INSERT INTO documents_fts(rowid, document_id, title, body) VALUES (new.id, new.document_id, new.title, new.body);\n\
            END;",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS folders (\
                connector_id TEXT NOT NULL,\
                folder_id TEXT NOT NULL,\
                title TEXT NOT NULL,\
                parent_id TEXT,\
                mime_type TEXT NOT NULL,\
                updated_at TEXT NOT NULL,\
                PRIMARY KEY (connector_id, folder_id)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connectors (\
                connector_id TEXT PRIMARY KEY,\
                bot_user_id TEXT,\
                whitelisted_bot_ids TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channels (\
                connector_id TEXT NOT NULL,\
                channel_id TEXT NOT NULL,\
                name TEXT NOT NULL,\
                permission TEXT NOT NULL,\
                visibility TEXT NOT NULL,\
                skip_reason TEXT,\
                PRIMARY KEY (connector_id, channel_id)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tracking_rows (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                connector_id TEXT NOT NULL,\
                channel_id TEXT NOT NULL,\
                document_id TEXT NOT NULL,\
                message_ts TEXT,\
                skip_reason TEXT,\
                UNIQUE(connector_id, channel_id, document_id)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tracking_channel ON tracking_rows(connector_id, channel_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // --- Documents ---
    //
    // Ids are only unique within a connector: two connectors tracking the
    // same channel each own their copy of its documents.

    #[instrument(skip(self, doc), fields(document_id = %doc.document_id))]
    pub async fn upsert_document(
        &self,
        connector_id: &str,
        doc: &Document,
        context: UpsertContext,
    ) -> Result<i64> {
        let sections = serde_json::to_string(&doc.sections)?;
        let tags = serde_json::to_string(&doc.tags)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO documents (connector_id, document_id, title, body, sections, source_url, timestamp_ms, tags, parent_id, mime_type, sync_type, updated_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
            ON CONFLICT(connector_id, document_id) DO UPDATE SET \
                title=excluded.title, \
                body=excluded.body, \
                sections=excluded.sections, \
                source_url=excluded.source_url, \
                timestamp_ms=excluded.timestamp_ms, \
                tags=excluded.tags, \
                parent_id=excluded.parent_id, \
                mime_type=excluded.mime_type, \
                sync_type=excluded.sync_type, \
                updated_at=excluded.updated_at \
            RETURNING id",
        )
        .bind(connector_id)
        .bind(&doc.document_id)
        .bind(&doc.title)
        .bind(doc.body())
        .bind(sections)
        .bind(&doc.source_url)
        .bind(doc.timestamp_ms)
        .bind(tags)
        .bind(&doc.parent_id)
        .bind(&doc.mime_type)
        .bind(context.sync_type.as_str())
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_document(
        &self,
        connector_id: &str,
        document_id: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT document_id, title, sections, source_url, timestamp_ms, tags, parent_id, mime_type \
            FROM documents WHERE connector_id = ?1 AND document_id = ?2",
        )
        .bind(connector_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(document_from_row).transpose()
    }

    pub async fn delete_document(&self, connector_id: &str, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE connector_id = ?1 AND document_id = ?2")
            .bind(connector_id)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn search_keyword(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT d.document_id, d.title, d.sections, d.source_url, d.timestamp_ms, d.tags, d.parent_id, d.mime_type \
            FROM documents_fts f JOIN documents d ON d.id = f.rowid \
            WHERE documents_fts MATCH ?1 \
            ORDER BY bm25(documents_fts) \
            LIMIT ?2",
        )
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(document_from_row).collect()
    }

    pub async fn document_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- Folders ---

    #[instrument(skip(self, folder), fields(folder_id = %folder.folder_id))]
    pub async fn upsert_folder(&self, connector_id: &str, folder: &Folder) -> Result<()> {
        sqlx::query(
            "INSERT INTO folders (connector_id, folder_id, title, parent_id, mime_type, updated_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
            ON CONFLICT(connector_id, folder_id) DO UPDATE SET \
                title=excluded.title, \
                parent_id=excluded.parent_id, \
                mime_type=excluded.mime_type, \
                updated_at=excluded.updated_at",
        )
        .bind(connector_id)
        .bind(&folder.folder_id)
        .bind(&folder.title)
        .bind(&folder.parent_id)
        .bind(&folder.mime_type)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_folder(&self, connector_id: &str, folder_id: &str) -> Result<Option<Folder>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, String)>(
            "SELECT folder_id, title, parent_id, mime_type FROM folders \
            WHERE connector_id = ?1 AND folder_id = ?2",
        )
        .bind(connector_id)
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(folder_id, title, parent_id, mime_type)| Folder {
            folder_id,
            title,
            parent_id,
            mime_type,
        }))
    }

    pub async fn delete_folder(&self, connector_id: &str, folder_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM folders WHERE connector_id = ?1 AND folder_id = ?2")
            .bind(connector_id)
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- Connectors ---

    pub async fn upsert_connector(&self, config: &ConnectorConfig) -> Result<()> {
        let whitelisted = serde_json::to_string(&config.whitelisted_bot_ids)?;
        sqlx::query(
            "INSERT INTO connectors (connector_id, bot_user_id, whitelisted_bot_ids) VALUES (?1, ?2, ?3) \
            ON CONFLICT(connector_id) DO UPDATE SET \
                bot_user_id=excluded.bot_user_id, \
                whitelisted_bot_ids=excluded.whitelisted_bot_ids",
        )
        .bind(&config.connector_id)
        .bind(&config.bot_user_id)
        .bind(whitelisted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_connector(&self, connector_id: &str) -> Result<Option<ConnectorConfig>> {
        let row = sqlx::query_as::<_, (String, Option<String>, String)>(
            "SELECT connector_id, bot_user_id, whitelisted_bot_ids FROM connectors WHERE connector_id = ?1",
        )
        .bind(connector_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((connector_id, bot_user_id, whitelisted)) => Ok(Some(ConnectorConfig {
                connector_id,
                bot_user_id,
                whitelisted_bot_ids: serde_json::from_str(&whitelisted)?,
            })),
            None => Ok(None),
        }
    }

    // --- Channels ---

    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id))]
    pub async fn upsert_channel(&self, connector_id: &str, channel: &Channel) -> Result<()> {
        sqlx::query(
            "INSERT INTO channels (connector_id, channel_id, name, permission, visibility, skip_reason) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
            ON CONFLICT(connector_id, channel_id) DO UPDATE SET \
                name=excluded.name, \
                permission=excluded.permission, \
                visibility=excluded.visibility, \
                skip_reason=excluded.skip_reason",
        )
        .bind(connector_id)
        .bind(&channel.channel_id)
        .bind(&channel.name)
        .bind(channel.permission.as_str())
        .bind(channel.visibility.as_str())
        .bind(&channel.skip_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_channel(
        &self,
        connector_id: &str,
        channel_id: &str,
    ) -> Result<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT channel_id, name, permission, visibility, skip_reason \
            FROM channels WHERE connector_id = ?1 AND channel_id = ?2",
        )
        .bind(connector_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(channel_from_row).transpose()
    }

    pub async fn list_channels(&self, connector_id: &str) -> Result<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT channel_id, name, permission, visibility, skip_reason \
            FROM channels WHERE connector_id = ?1 ORDER BY channel_id",
        )
        .bind(connector_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(channel_from_row).collect()
    }

    /// Remove a channel and whatever tracking rows are left for it.
    pub async fn delete_channel(&self, connector_id: &str, channel_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tracking_rows WHERE connector_id = ?1 AND channel_id = ?2")
            .bind(connector_id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM channels WHERE connector_id = ?1 AND channel_id = ?2")
            .bind(connector_id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // --- Tracking rows ---

    pub async fn find_row(
        &self,
        connector_id: &str,
        channel_id: &str,
        document_id: &str,
    ) -> Result<Option<TrackingRow>> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            "SELECT connector_id, channel_id, document_id, message_ts, skip_reason \
            FROM tracking_rows WHERE connector_id = ?1 AND channel_id = ?2 AND document_id = ?3",
        )
        .bind(connector_id)
        .bind(channel_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(tracking_row_from_tuple))
    }

    /// Insert a row; a concurrent insert of the same key is a no-op.
    #[instrument(skip(self, row), fields(document_id = %row.document_id))]
    pub async fn create_row(&self, row: &TrackingRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO tracking_rows (connector_id, channel_id, document_id, message_ts, skip_reason) \
            VALUES (?1, ?2, ?3, ?4, ?5) \
            ON CONFLICT(connector_id, channel_id, document_id) DO NOTHING",
        )
        .bind(&row.connector_id)
        .bind(&row.channel_id)
        .bind(&row.document_id)
        .bind(&row.message_ts)
        .bind(&row.skip_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_row(&self, row: &TrackingRow) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tracking_rows SET message_ts = ?4, skip_reason = ?5 \
            WHERE connector_id = ?1 AND channel_id = ?2 AND document_id = ?3",
        )
        .bind(&row.connector_id)
        .bind(&row.channel_id)
        .bind(&row.document_id)
        .bind(&row.message_ts)
        .bind(&row.skip_reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("tracking row not found: {}", row.document_id));
        }
        Ok(())
    }

    /// First `limit` rows of a channel, oldest first.
    pub async fn rows_page(
        &self,
        connector_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<TrackingRow>> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            "SELECT connector_id, channel_id, document_id, message_ts, skip_reason \
            FROM tracking_rows WHERE connector_id = ?1 AND channel_id = ?2 \
            ORDER BY id LIMIT ?3",
        )
        .bind(connector_id)
        .bind(channel_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(tracking_row_from_tuple).collect())
    }

    pub async fn destroy_rows(
        &self,
        connector_id: &str,
        channel_id: &str,
        document_ids: &[String],
    ) -> Result<u64> {
        if document_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = (0..document_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(",");
        let query = format!(
            "DELETE FROM tracking_rows WHERE connector_id = ?1 AND channel_id = ?2 AND document_id IN ({})",
            placeholders
        );
        let mut q = sqlx::query(&query).bind(connector_id).bind(channel_id);
        for id in document_ids {
            q = q.bind(id);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Channels that currently own at least one tracked document.
    pub async fn document_channel_ids(&self, connector_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT DISTINCT channel_id FROM tracking_rows WHERE connector_id = ?1 ORDER BY channel_id",
        )
        .bind(connector_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn row_count(&self, connector_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tracking_rows WHERE connector_id = ?1")
                .bind(connector_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn document_from_row(row: DocumentRow) -> Result<Document> {
    let (document_id, title, sections, source_url, timestamp_ms, tags, parent_id, mime_type) = row;
    Ok(Document {
        document_id,
        title,
        sections: serde_json::from_str(&sections)?,
        source_url,
        timestamp_ms,
        tags: serde_json::from_str(&tags)?,
        parent_id,
        mime_type,
    })
}

fn channel_from_row(row: ChannelRow) -> Result<Channel> {
    let (channel_id, name, permission, visibility, skip_reason) = row;
    Ok(Channel {
        permission: PermissionLevel::parse(&permission)
            .ok_or_else(|| {
                anyhow!("invalid permission '{}' on channel {}", permission, channel_id)
            })?,
        visibility: Visibility::parse(&visibility)
            .ok_or_else(|| {
                anyhow!("invalid visibility '{}' on channel {}", visibility, channel_id)
            })?,
        channel_id,
        name,
        skip_reason,
    })
}

fn tracking_row_from_tuple(
    (connector_id, channel_id, document_id, message_ts, skip_reason): (
        String,
        String,
        String,
        Option<String>,
        Option<String>,
    ),
) -> TrackingRow {
    TrackingRow {
        connector_id,
        channel_id,
        document_id,
        message_ts,
        skip_reason,
    }
}
