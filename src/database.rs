//! # Redis
//!
//! Production [`Storage`] backend.
//!
//! Core purpose is to store story/page records and per-user like relations,
//! and to provide the atomic increment/decrement the like counter depends on.
//!
//! ## Layout
//!
//! - `story:{id}`: story metadata as a JSON string (immutable fields only)
//! - `story:{id}:likes`: 64-bit counter, moved by `INCRBY` exclusively
//! - `story:{id}:pages`: sorted set, score = page number, member = page JSON
//! - `stories.by_created`: sorted set, score = created_at millis, member = id
//! - `user:{id}:likes`: sorted set, score = liked_at millis, member = story id
//!
//! Relation idempotency rides on Redis itself: `ZADD NX` reports whether a
//! member was actually added and `ZREM` whether one was removed, so a retried
//! like can never double-count. The counter and page count are merged into the
//! story record at read time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};

use crate::models::{LikeRelation, Page, Story};
use crate::store::{Storage, StorageError};

const STORIES_BY_CREATED: &str = "stories.by_created";

fn story_key(story_id: &str) -> String {
    format!("story:{story_id}")
}

fn likes_key(story_id: &str) -> String {
    format!("story:{story_id}:likes")
}

fn pages_key(story_id: &str) -> String {
    format!("story:{story_id}:pages")
}

fn user_likes_key(user_id: &str) -> String {
    format!("user:{user_id}:likes")
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager_with_config(config).await?;

        Ok(Self { conn })
    }

    async fn hydrate(
        &self,
        conn: &mut ConnectionManager,
        raw: &str,
    ) -> Result<Story, StorageError> {
        let mut story: Story = serde_json::from_str(raw)?;

        let likes: Option<i64> = conn.get(likes_key(&story.story_id)).await?;
        story.likes_count = likes.unwrap_or(0).max(0) as u32;

        let pages: i64 = conn.zcard(pages_key(&story.story_id)).await?;
        story.current_page_number = pages as u32;

        Ok(story)
    }

    async fn hydrate_ids(&self, ids: Vec<String>) -> Result<Vec<Story>, StorageError> {
        let mut conn = self.conn.clone();
        let mut stories = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(story_key(&id)).await?;
            if let Some(raw) = raw {
                stories.push(self.hydrate(&mut conn, &raw).await?);
            }
        }
        Ok(stories)
    }
}

#[async_trait]
impl Storage for RedisStore {
    async fn put_story(&self, story: Story) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&story)?;
        let () = conn.set(story_key(&story.story_id), raw).await?;
        let () = conn
            .zadd(
                STORIES_BY_CREATED,
                &story.story_id,
                story.created_at.timestamp_millis(),
            )
            .await?;
        Ok(())
    }

    async fn put_page(&self, page: Page) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(story_key(&page.story_id)).await?;
        if !exists {
            return Err(StorageError::UnknownStory(page.story_id));
        }

        let taken: Vec<String> = conn
            .zrangebyscore(pages_key(&page.story_id), page.page_number, page.page_number)
            .await?;
        if !taken.is_empty() {
            return Err(StorageError::DuplicatePage {
                story_id: page.story_id,
                page_number: page.page_number,
            });
        }

        let raw = serde_json::to_string(&page)?;
        let () = conn
            .zadd(pages_key(&page.story_id), raw, page.page_number)
            .await?;
        Ok(())
    }

    async fn get_story(&self, story_id: &str) -> Result<Option<Story>, StorageError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(story_key(story_id)).await?;
        match raw {
            Some(raw) => Ok(Some(self.hydrate(&mut conn, &raw).await?)),
            None => Ok(None),
        }
    }

    async fn list_stories(&self, limit: usize) -> Result<Vec<Story>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(STORIES_BY_CREATED, 0, limit as isize - 1)
            .await?;
        self.hydrate_ids(ids).await
    }

    async fn stories_since(&self, since: DateTime<Utc>) -> Result<Vec<Story>, StorageError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrangebyscore(STORIES_BY_CREATED, "+inf", since.timestamp_millis())
            .await?;
        self.hydrate_ids(ids).await
    }

    async fn pages_for(&self, story_id: &str) -> Result<Vec<Page>, StorageError> {
        let mut conn = self.conn.clone();
        let raws: Vec<String> = conn.zrange(pages_key(story_id), 0, -1).await?;
        raws.iter()
            .map(|raw| serde_json::from_str(raw).map_err(StorageError::from))
            .collect()
    }

    async fn recent_pages(&self, story_id: &str, n: usize) -> Result<Vec<Page>, StorageError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raws: Vec<String> = conn
            .zrevrange(pages_key(story_id), 0, n as isize - 1)
            .await?;
        raws.iter()
            .map(|raw| serde_json::from_str(raw).map_err(StorageError::from))
            .collect()
    }

    async fn insert_like(&self, relation: LikeRelation) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        // NX makes the retry case a no-op that reports 0 added.
        let added: i64 = redis::cmd("ZADD")
            .arg(user_likes_key(&relation.user_id))
            .arg("NX")
            .arg(relation.created_at.timestamp_millis())
            .arg(&relation.story_id)
            .query_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn remove_like(&self, user_id: &str, story_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(user_likes_key(user_id), story_id).await?;
        Ok(removed == 1)
    }

    async fn adjust_likes(&self, story_id: &str, delta: i32) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.incr(likes_key(story_id), delta as i64).await?;
        Ok(())
    }

    async fn likes_for_user(&self, user_id: &str) -> Result<Vec<LikeRelation>, StorageError> {
        let mut conn = self.conn.clone();
        let rows: Vec<(String, i64)> = conn
            .zrevrange_withscores(user_likes_key(user_id), 0, -1)
            .await?;

        rows.into_iter()
            .map(|(story_id, millis)| {
                let created_at = DateTime::<Utc>::from_timestamp_millis(millis)
                    .ok_or_else(|| StorageError::Corrupt(format!("liked_at score {millis}")))?;
                Ok(LikeRelation {
                    user_id: user_id.to_string(),
                    story_id,
                    created_at,
                })
            })
            .collect()
    }
}
