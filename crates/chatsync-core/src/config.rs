//! Engine configuration.
//!
//! Loaded from `sync.toml` in the data directory when present, otherwise
//! defaults. Every numeric limit can be overridden with a `CHATSYNC_*`
//! environment variable.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Page size for channel history fetches.
    pub history_page_size: usize,
    /// Page size for thread reply fetches.
    pub replies_page_size: usize,
    /// Page fetches allowed per chunk invocation before it flushes and yields.
    pub chunk_api_call_budget: usize,
    /// Messages kept per bucket document; older ones are dropped past this.
    pub max_total_messages: usize,
    /// Thread/bucket units running at once for one channel.
    pub concurrency: usize,
    /// Tracking rows deleted per batch during garbage collection.
    pub gc_batch_size: usize,
    /// Emit a liveness signal every N iterations of a long loop.
    pub heartbeat_every: usize,
    pub users_page_size: usize,
    pub slack: SlackConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_page_size: 100,
            replies_page_size: 200,
            chunk_api_call_budget: 10,
            max_total_messages: 4000,
            concurrency: 2,
            gc_batch_size: 1000,
            heartbeat_every: 50,
            users_page_size: 200,
            slack: SlackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base_url: String,
    /// Environment variable holding the bot token.
    pub token_env: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://slack.com/api".to_string(),
            token_env: "SLACK_BOT_TOKEN".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from file, then apply `CHATSYNC_*` overrides from the environment.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        Ok(Self::load(path)?.with_overrides(|name| std::env::var(name).ok()))
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str, current: usize| -> usize {
            lookup(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(current)
        };

        self.history_page_size = read("CHATSYNC_HISTORY_PAGE_SIZE", self.history_page_size);
        self.replies_page_size = read("CHATSYNC_REPLIES_PAGE_SIZE", self.replies_page_size);
        self.chunk_api_call_budget =
            read("CHATSYNC_CHUNK_API_CALL_BUDGET", self.chunk_api_call_budget);
        self.max_total_messages = read("CHATSYNC_MAX_TOTAL_MESSAGES", self.max_total_messages);
        self.concurrency = read("CHATSYNC_CONCURRENCY", self.concurrency);
        self.gc_batch_size = read("CHATSYNC_GC_BATCH_SIZE", self.gc_batch_size);
        self.heartbeat_every = read("CHATSYNC_HEARTBEAT_EVERY", self.heartbeat_every);
        self.users_page_size = read("CHATSYNC_USERS_PAGE_SIZE", self.users_page_size);
        if let Some(url) = lookup("CHATSYNC_SLACK_API_BASE_URL") {
            self.slack.api_base_url = url;
        }
        self
    }
}
