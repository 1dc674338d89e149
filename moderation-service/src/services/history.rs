use std::sync::Arc;

use chrono::Utc;

use super::{ServiceError, Store};
use crate::models::{NewPostHistory, Post, PostHistory};

/// Versioned copies of posts, written right before each update.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn Store>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn snapshot_before_update(&self, post: &Post) -> Result<PostHistory, ServiceError> {
        let entry = self
            .store
            .insert_post_history(NewPostHistory::capture(post, Utc::now()))
            .await?;
        tracing::debug!(post_id = post.id, history_id = entry.id, "Post snapshot written");
        Ok(entry)
    }

    /// Newest first.
    pub async fn get_history(&self, post_id: i64) -> Result<Vec<PostHistory>, ServiceError> {
        self.store.find_post_history(post_id).await
    }
}
