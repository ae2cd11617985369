//! Session-local mirror of "which stories has this user liked".
//!
//! [`LikeCache`] applies a toggle optimistically so the UI can reflect it
//! before the server answers, then reconciles: success keeps the flip,
//! failure reverts it. A per-story in-flight gate serializes rapid toggles on
//! the same story so the cache and the server cannot end up permanently
//! disagreeing; toggles on different stories proceed independently.
//!
//! The cache is an explicitly constructed service handed to whoever needs it,
//! never a global. It is the only writer of the liked-set.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::AppError;
use crate::ledger::EngagementLedger;

/// What the cache needs from the server side. The HTTP client used by a real
/// frontend and the in-process [`LedgerApi`] both satisfy it.
#[async_trait]
pub trait EngagementApi: Send + Sync {
    async fn like(&self, story_id: &str) -> Result<(), AppError>;
    async fn unlike(&self, story_id: &str) -> Result<(), AppError>;
    /// Story ids the user currently likes.
    async fn user_likes(&self) -> Result<Vec<String>, AppError>;
}

struct CacheState {
    liked: HashSet<String>,
    // bumped by load_user_likes; a toggle whose request outlived a reload
    // must not touch the replaced set
    generation: u64,
}

pub struct LikeCache {
    api: Arc<dyn EngagementApi>,
    state: Mutex<CacheState>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LikeCache {
    pub fn new(api: Arc<dyn EngagementApi>) -> Self {
        Self {
            api,
            state: Mutex::new(CacheState {
                liked: HashSet::new(),
                generation: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_liked(&self, story_id: &str) -> bool {
        self.state.lock().unwrap().liked.contains(story_id)
    }

    pub fn liked_ids(&self) -> HashSet<String> {
        self.state.lock().unwrap().liked.clone()
    }

    /// Flip the like state for one story. The local set changes immediately;
    /// the matching network call runs after. On failure the pre-toggle state
    /// is restored and the error surfaced. Returns the confirmed new state.
    pub async fn toggle_like(&self, story_id: &str) -> Result<bool, AppError> {
        let gate = self.gate(story_id);
        let _serialized = gate.lock().await;

        let (was_liked, generation) = {
            let mut state = self.state.lock().unwrap();
            let was_liked = state.liked.contains(story_id);
            if was_liked {
                state.liked.remove(story_id);
            } else {
                state.liked.insert(story_id.to_string());
            }
            (was_liked, state.generation)
        };

        let result = if was_liked {
            self.api.unlike(story_id).await
        } else {
            self.api.like(story_id).await
        };

        if let Err(err) = result {
            let mut state = self.state.lock().unwrap();
            if state.generation == generation {
                if was_liked {
                    state.liked.insert(story_id.to_string());
                } else {
                    state.liked.remove(story_id);
                }
            }
            drop(state);
            drop(_serialized);
            self.release(story_id, &gate);
            return Err(err);
        }

        drop(_serialized);
        self.release(story_id, &gate);
        Ok(!was_liked)
    }

    /// Replace the whole liked-set with the server's current truth. A fresh
    /// load wins over any in-flight optimistic state.
    pub async fn load_user_likes(&self) -> Result<(), AppError> {
        let ids = self.api.user_likes().await?;
        let mut state = self.state.lock().unwrap();
        state.liked = ids.into_iter().collect();
        state.generation += 1;
        Ok(())
    }

    fn gate(&self, story_id: &str) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .unwrap()
            .entry(story_id.to_string())
            .or_default()
            .clone()
    }

    fn release(&self, story_id: &str, gate: &Arc<AsyncMutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap();
        // map entry + our clone: nobody else is waiting on this story
        if Arc::strong_count(gate) == 2 {
            in_flight.remove(story_id);
        }
    }
}

/// In-process [`EngagementApi`] that calls the ledger directly, for embedded
/// deployments and tests.
pub struct LedgerApi {
    ledger: EngagementLedger,
    user_id: String,
}

impl LedgerApi {
    pub fn new(ledger: EngagementLedger, user_id: impl Into<String>) -> Self {
        Self {
            ledger,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl EngagementApi for LedgerApi {
    async fn like(&self, story_id: &str) -> Result<(), AppError> {
        self.ledger.like(&self.user_id, story_id).await
    }

    async fn unlike(&self, story_id: &str) -> Result<(), AppError> {
        self.ledger.unlike(&self.user_id, story_id).await
    }

    async fn user_likes(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .ledger
            .user_likes(&self.user_id)
            .await?
            .into_iter()
            .map(|like| like.story_id)
            .collect())
    }
}
