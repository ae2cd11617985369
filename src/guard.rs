//! Binds a relation write to its counter adjustment.
//!
//! The relation row is authoritative; the denormalized `likes_count` is a
//! best-effort projection. The adjustment itself is a single atomic
//! delta-apply inside the store, so concurrent toggles on one story cannot
//! lose an update. If the store faults on the adjustment, the guard retries a
//! bounded number of times and then logs the drift instead of failing the
//! outer call. `likes_count` heals on the next reconciliation pass while the
//! ledger stays exact.

use std::sync::Arc;

use tracing::{error, warn};

use crate::store::Storage;

const ADJUST_RETRIES: usize = 3;

#[derive(Clone)]
pub struct ConsistencyGuard {
    store: Arc<dyn Storage>,
}

impl ConsistencyGuard {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Apply `delta` to a story's like counter. Never fails: exhausted
    /// retries leave the counter behind the ledger and emit a drift event.
    pub async fn apply(&self, story_id: &str, delta: i32) {
        let mut attempt = 0;
        loop {
            match self.store.adjust_likes(story_id, delta).await {
                Ok(()) => return,
                Err(err) if attempt < ADJUST_RETRIES => {
                    attempt += 1;
                    warn!(story_id, delta, attempt, %err, "like counter adjustment failed, retrying");
                }
                Err(err) => {
                    error!(story_id, delta, %err, "like counter drift: adjustment abandoned");
                    return;
                }
            }
        }
    }
}
