//! The engagement ledger: the authoritative per-user like relation set.
//!
//! Every effective relation change is followed by exactly one counter
//! adjustment through the [`ConsistencyGuard`]: never zero, never two.
//! Idempotent replays (a client retrying after an ambiguous network error)
//! change nothing and adjust nothing.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::guard::ConsistencyGuard;
use crate::models::{LikeRelation, LikedStory};
use crate::store::Storage;

#[derive(Clone)]
pub struct EngagementLedger {
    store: Arc<dyn Storage>,
    guard: ConsistencyGuard,
}

impl EngagementLedger {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self {
            guard: ConsistencyGuard::new(store.clone()),
            store,
        }
    }

    /// Record that `user_id` likes `story_id`. A duplicate like is success:
    /// no second row, no second increment.
    pub async fn like(&self, user_id: &str, story_id: &str) -> Result<(), AppError> {
        if self.store.get_story(story_id).await?.is_none() {
            return Err(AppError::NotFound(format!("story {story_id}")));
        }

        let inserted = self
            .store
            .insert_like(LikeRelation::new(user_id, story_id))
            .await?;
        if inserted {
            self.guard.apply(story_id, 1).await;
        } else {
            debug!(user_id, story_id, "duplicate like ignored");
        }
        Ok(())
    }

    /// Remove the relation if present. Unliking something never liked is a
    /// no-op success and leaves the counter untouched.
    pub async fn unlike(&self, user_id: &str, story_id: &str) -> Result<(), AppError> {
        let removed = self.store.remove_like(user_id, story_id).await?;
        if removed {
            self.guard.apply(story_id, -1).await;
        }
        Ok(())
    }

    /// A user's likes, most recent first, each joined with its story. Always
    /// a fresh read of current state.
    pub async fn user_likes(&self, user_id: &str) -> Result<Vec<LikedStory>, AppError> {
        let relations = self.store.likes_for_user(user_id).await?;

        let mut likes = Vec::with_capacity(relations.len());
        for relation in relations {
            match self.store.get_story(&relation.story_id).await? {
                Some(story) => likes.push(LikedStory {
                    story_id: relation.story_id,
                    liked_at: relation.created_at,
                    story,
                }),
                None => warn!(story_id = %relation.story_id, "liked story missing from store"),
            }
        }
        Ok(likes)
    }
}
