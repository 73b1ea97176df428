//! User directory used to render author names and mentions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::error::SyncResult;
use crate::SyncEngine;

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    names: Arc<RwLock<HashMap<String, String>>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.names.read().await
    }

    pub async fn name_of(&self, user_id: &str) -> Option<String> {
        self.names.read().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Swap in a freshly fetched directory.
    pub async fn replace(&self, names: HashMap<String, String>) {
        *self.names.write().await = names;
    }
}

impl SyncEngine {
    /// Page through the platform's user list and refresh the directory.
    ///
    /// Returns the number of users cached.
    pub async fn fetch_users(&self, connector_id: &str) -> SyncResult<usize> {
        self.connector(connector_id).await?;

        let mut names = HashMap::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .platform
                .users_list(cursor.as_deref(), self.config.users_page_size)
                .await?;
            pages += 1;
            for user in page.users {
                names.insert(user.id.clone(), user.best_name());
            }
            self.tick(pages, "fetching users");

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let count = names.len();
        self.users.replace(names).await;
        info!(connector_id, count, pages, "user directory refreshed");
        Ok(count)
    }
}
