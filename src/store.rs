//! Storage abstraction over the story, page, and like-ledger records.
//!
//! Two backends implement [`Storage`]: the in-process [`MemoryStore`] (default,
//! used by the test suite) and the Redis-backed store in [`crate::database`].
//! Both must provide `adjust_likes` as a single atomic delta-apply; callers are
//! never allowed to read the counter and write a new value back, because two
//! concurrent toggles on the same story would lose an update.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{LikeRelation, Page, Story};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("redis fault: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("record encoding fault: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("unknown story {0}")]
    UnknownStory(String),

    #[error("page {page_number} already exists for story {story_id}")]
    DuplicatePage { story_id: String, page_number: u32 },
}

/// Backing-store contract.
///
/// Relation writes (`insert_like` / `remove_like`) report whether the relation
/// set actually changed, so the ledger can apply exactly one counter
/// adjustment per effective change and none for idempotent replays.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put_story(&self, story: Story) -> Result<(), StorageError>;

    /// Ingest one page. Rejects duplicate page numbers; bumps the story's
    /// `current_page_number`.
    async fn put_page(&self, page: Page) -> Result<(), StorageError>;

    async fn get_story(&self, story_id: &str) -> Result<Option<Story>, StorageError>;

    /// Up to `limit` stories, newest `created_at` first.
    async fn list_stories(&self, limit: usize) -> Result<Vec<Story>, StorageError>;

    /// Stories with `created_at >= since`, newest first.
    async fn stories_since(&self, since: DateTime<Utc>) -> Result<Vec<Story>, StorageError>;

    /// All pages of a story, ascending `page_number`.
    async fn pages_for(&self, story_id: &str) -> Result<Vec<Page>, StorageError>;

    /// The last `n` pages by `page_number`, newest first. Clamped to the
    /// number of pages available.
    async fn recent_pages(&self, story_id: &str, n: usize) -> Result<Vec<Page>, StorageError>;

    /// Insert the relation if absent. Returns `true` if a row was created,
    /// `false` if the pair already existed.
    async fn insert_like(&self, relation: LikeRelation) -> Result<bool, StorageError>;

    /// Delete the relation if present. Returns `true` if a row was removed.
    async fn remove_like(&self, user_id: &str, story_id: &str) -> Result<bool, StorageError>;

    /// Atomically apply `delta` to the story's denormalized like counter,
    /// floored at zero. Only the consistency guard calls this.
    async fn adjust_likes(&self, story_id: &str, delta: i32) -> Result<(), StorageError>;

    /// A user's like relations, most recently liked first.
    async fn likes_for_user(&self, user_id: &str) -> Result<Vec<LikeRelation>, StorageError>;
}

/// In-process store. A single mutex over the whole state makes every relation
/// write and counter adjustment atomic with respect to each other, which is
/// exactly the primitive the consistency guard requires.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemInner>,
}

#[derive(Default)]
struct MemInner {
    stories: HashMap<String, Story>,
    pages: HashMap<String, BTreeMap<u32, Page>>,
    // per user, in like order; read newest-first
    likes: HashMap<String, Vec<LikeRelation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn put_story(&self, story: Story) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stories.insert(story.story_id.clone(), story);
        Ok(())
    }

    async fn put_page(&self, page: Page) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.stories.contains_key(&page.story_id) {
            return Err(StorageError::UnknownStory(page.story_id));
        }
        let pages = inner.pages.entry(page.story_id.clone()).or_default();
        if pages.contains_key(&page.page_number) {
            return Err(StorageError::DuplicatePage {
                story_id: page.story_id,
                page_number: page.page_number,
            });
        }
        let story_id = page.story_id.clone();
        pages.insert(page.page_number, page);
        if let Some(story) = inner.stories.get_mut(&story_id) {
            story.current_page_number += 1;
        }
        Ok(())
    }

    async fn get_story(&self, story_id: &str) -> Result<Option<Story>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.stories.get(story_id).cloned())
    }

    async fn list_stories(&self, limit: usize) -> Result<Vec<Story>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut stories: Vec<Story> = inner.stories.values().cloned().collect();
        stories.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.story_id.cmp(&b.story_id))
        });
        stories.truncate(limit);
        Ok(stories)
    }

    async fn stories_since(&self, since: DateTime<Utc>) -> Result<Vec<Story>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut stories: Vec<Story> = inner
            .stories
            .values()
            .filter(|s| s.created_at >= since)
            .cloned()
            .collect();
        stories.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.story_id.cmp(&b.story_id))
        });
        Ok(stories)
    }

    async fn pages_for(&self, story_id: &str) -> Result<Vec<Page>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pages
            .get(story_id)
            .map(|pages| pages.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn recent_pages(&self, story_id: &str, n: usize) -> Result<Vec<Page>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pages
            .get(story_id)
            .map(|pages| pages.values().rev().take(n).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_like(&self, relation: LikeRelation) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let rows = inner.likes.entry(relation.user_id.clone()).or_default();
        if rows.iter().any(|r| r.story_id == relation.story_id) {
            return Ok(false);
        }
        rows.push(relation);
        Ok(true)
    }

    async fn remove_like(&self, user_id: &str, story_id: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(rows) = inner.likes.get_mut(user_id) else {
            return Ok(false);
        };
        let Some(pos) = rows.iter().position(|r| r.story_id == story_id) else {
            return Ok(false);
        };
        rows.remove(pos);
        Ok(true)
    }

    async fn adjust_likes(&self, story_id: &str, delta: i32) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let story = inner
            .stories
            .get_mut(story_id)
            .ok_or_else(|| StorageError::UnknownStory(story_id.to_string()))?;
        story.likes_count = story.likes_count.saturating_add_signed(delta);
        Ok(())
    }

    async fn likes_for_user(&self, user_id: &str) -> Result<Vec<LikeRelation>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .likes
            .get(user_id)
            .map(|rows| rows.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(title: &str) -> Story {
        Story::new(title, "fantasy", "whimsical", None)
    }

    fn page(story_id: &str, number: u32) -> Page {
        Page {
            story_id: story_id.to_string(),
            page_number: number,
            content: format!("page {number}"),
        }
    }

    #[tokio::test]
    async fn duplicate_page_number_is_rejected() {
        let store = MemoryStore::new();
        let s = story("a");
        let id = s.story_id.clone();
        store.put_story(s).await.unwrap();

        store.put_page(page(&id, 1)).await.unwrap();
        let err = store.put_page(page(&id, 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicatePage { .. }));

        let stored = store.get_story(&id).await.unwrap().unwrap();
        assert_eq!(stored.current_page_number, 1);
    }

    #[tokio::test]
    async fn page_for_unknown_story_is_rejected() {
        let store = MemoryStore::new();
        let err = store.put_page(page("nope", 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownStory(_)));
    }

    #[tokio::test]
    async fn pages_come_back_ascending_even_when_ingested_out_of_order() {
        let store = MemoryStore::new();
        let s = story("a");
        let id = s.story_id.clone();
        store.put_story(s).await.unwrap();
        for number in [3, 1, 2] {
            store.put_page(page(&id, number)).await.unwrap();
        }

        let numbers: Vec<u32> = store
            .pages_for(&id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.page_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn recent_pages_returns_newest_first_and_clamps() {
        let store = MemoryStore::new();
        let s = story("a");
        let id = s.story_id.clone();
        store.put_story(s).await.unwrap();
        for number in 1..=4 {
            store.put_page(page(&id, number)).await.unwrap();
        }

        let numbers: Vec<u32> = store
            .recent_pages(&id, 2)
            .await
            .unwrap()
            .iter()
            .map(|p| p.page_number)
            .collect();
        assert_eq!(numbers, vec![4, 3]);

        let all = store.recent_pages(&id, 50).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn insert_like_reports_whether_the_relation_changed() {
        let store = MemoryStore::new();
        let s = story("a");
        let id = s.story_id.clone();
        store.put_story(s).await.unwrap();

        assert!(store
            .insert_like(LikeRelation::new("u1", id.clone()))
            .await
            .unwrap());
        assert!(!store
            .insert_like(LikeRelation::new("u1", id.clone()))
            .await
            .unwrap());

        assert!(store.remove_like("u1", &id).await.unwrap());
        assert!(!store.remove_like("u1", &id).await.unwrap());
    }

    #[tokio::test]
    async fn adjust_likes_floors_at_zero() {
        let store = MemoryStore::new();
        let s = story("a");
        let id = s.story_id.clone();
        store.put_story(s).await.unwrap();

        store.adjust_likes(&id, -5).await.unwrap();
        assert_eq!(store.get_story(&id).await.unwrap().unwrap().likes_count, 0);

        store.adjust_likes(&id, 2).await.unwrap();
        store.adjust_likes(&id, -1).await.unwrap();
        assert_eq!(store.get_story(&id).await.unwrap().unwrap().likes_count, 1);
    }

    #[tokio::test]
    async fn likes_for_user_lists_most_recent_first() {
        let store = MemoryStore::new();
        let (a, b) = (story("a"), story("b"));
        let (id_a, id_b) = (a.story_id.clone(), b.story_id.clone());
        store.put_story(a).await.unwrap();
        store.put_story(b).await.unwrap();

        store
            .insert_like(LikeRelation::new("u1", id_a.clone()))
            .await
            .unwrap();
        store
            .insert_like(LikeRelation::new("u1", id_b.clone()))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .likes_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.story_id)
            .collect();
        assert_eq!(ids, vec![id_b, id_a]);
    }
}
