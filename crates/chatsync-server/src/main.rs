use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use chatsync_core::{
    emit_progress, IngestionEngine, ProgressHeartbeat, ServerPaths, SlackClient, SyncConfig,
    SyncEngine,
};

mod activities;

use activities::{ActivityHandler, ActivityRequest, ActivityResponse};

#[tokio::main]
async fn main() -> Result<()> {
    // Route tracing to stderr so stdout is reserved for CHATSYNC_PROGRESS
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let paths = ServerPaths::from_env();
    paths.ensure_dirs()?;

    let config = SyncConfig::load_with_env(&paths.config_path)?;
    let platform = Arc::new(SlackClient::from_config(reqwest::Client::new(), &config.slack)?);
    let ingest = IngestionEngine::new(&paths.db_path).await?;
    let engine = SyncEngine::with_ingest(
        platform,
        ingest.clone(),
        Arc::new(ProgressHeartbeat::new("slack")),
        config,
    );
    let handler = Arc::new(ActivityHandler::new(engine, ingest));

    if Path::new(&paths.admin_socket_path).exists() {
        std::fs::remove_file(&paths.admin_socket_path)?;
    }
    let listener = UnixListener::bind(&paths.admin_socket_path)?;
    info!("Activity host listening on {}", paths.admin_socket_path.display());
    emit_progress("slack", "ready", "activity host listening", None);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, handler).await {
                        error!("Activity client error: {}", err);
                    }
                });
            }
            Err(err) => {
                error!("Accept error: {}", err);
            }
        }
    }
}

async fn handle_client(
    stream: tokio::net::UnixStream,
    handler: Arc<ActivityHandler>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Responses go out as their activities finish, not in request order.
    let (tx, mut rx) = mpsc::unbounded_channel::<ActivityResponse>();
    let write_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let payload = match serde_json::to_string(&response) {
                Ok(p) => p,
                Err(err) => {
                    error!("Failed to serialize activity response: {}", err);
                    continue;
                }
            };
            if let Err(err) = writer.write_all(payload.as_bytes()).await {
                error!("Failed to write activity response: {}", err);
                break;
            }
            if let Err(err) = writer.write_all(b"\n").await {
                error!("Failed to write newline: {}", err);
                break;
            }
        }
    });

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<ActivityRequest>(trimmed) {
            Ok(request) => {
                info!(id = ?request.id, activity = %request.activity, "activity received");
                let handler = handler.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = handler.handle(request).await;
                    let _ = tx.send(response);
                });
            }
            Err(err) => {
                info!("Failed to parse activity request: {}", err);
                let _ = tx.send(ActivityResponse::failure(
                    None,
                    format!("invalid request: {}", err),
                    false,
                ));
            }
        }
    }

    drop(tx);
    let _ = write_task.await;
    Ok(())
}
