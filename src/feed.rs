//! Read-only feed composition: story metadata joined with ordered pages.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{Page, Story, StoryWithPages};
use crate::store::Storage;

#[derive(Clone)]
pub struct FeedComposer {
    store: Arc<dyn Storage>,
}

impl FeedComposer {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Up to `limit` stories, newest first, each with its full page list in
    /// ascending page order. Stories with zero pages are included; callers
    /// filter if they only want readable ones.
    pub async fn feed(&self, limit: usize) -> Result<Vec<StoryWithPages>, AppError> {
        let stories = self.store.list_stories(limit).await?;

        let mut feed = Vec::with_capacity(stories.len());
        for story in stories {
            let pages = self.store.pages_for(&story.story_id).await?;
            feed.push(StoryWithPages {
                metadata: story,
                pages,
            });
        }
        Ok(feed)
    }

    /// Metadata-only list of stories created at or after `since`, newest
    /// first. Backs the "today's stories" view.
    pub async fn created_since(&self, since: DateTime<Utc>) -> Result<Vec<Story>, AppError> {
        Ok(self.store.stories_since(since).await?)
    }

    /// One story with all of its pages, or `NotFound`.
    pub async fn story(&self, story_id: &str) -> Result<StoryWithPages, AppError> {
        let story = self
            .store
            .get_story(story_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("story {story_id}")))?;
        let pages = self.store.pages_for(story_id).await?;
        Ok(StoryWithPages {
            metadata: story,
            pages,
        })
    }

    /// The last `n` pages by page number, re-ordered oldest-to-newest before
    /// returning; callers never see descending order. `n` is clamped to the
    /// pages available.
    pub async fn recent_pages(&self, story_id: &str, n: u32) -> Result<Vec<Page>, AppError> {
        let mut pages = self.store.recent_pages(story_id, n as usize).await?;
        pages.reverse();
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Story;
    use crate::store::MemoryStore;

    async fn seed_story(store: &MemoryStore, title: &str, pages: u32) -> String {
        let story = Story::new(title, "fantasy", "dark", None);
        let id = story.story_id.clone();
        store.put_story(story).await.unwrap();
        for number in 1..=pages {
            store
                .put_page(Page {
                    story_id: id.clone(),
                    page_number: number,
                    content: format!("{title} page {number}"),
                })
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn feed_pairs_each_story_with_ascending_pages() {
        let store = Arc::new(MemoryStore::new());
        seed_story(&store, "a", 3).await;
        seed_story(&store, "b", 0).await;
        let composer = FeedComposer::new(store);

        let feed = composer.feed(10).await.unwrap();
        assert_eq!(feed.len(), 2);

        for entry in &feed {
            let numbers: Vec<u32> = entry.pages.iter().map(|p| p.page_number).collect();
            let mut sorted = numbers.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(numbers, sorted, "pages must be strictly ascending");
        }

        // zero-page story still present
        assert!(feed.iter().any(|e| e.pages.is_empty()));
    }

    #[tokio::test]
    async fn feed_respects_the_limit() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5 {
            seed_story(&store, &format!("s{i}"), 1).await;
        }
        let composer = FeedComposer::new(store);

        assert_eq!(composer.feed(3).await.unwrap().len(), 3);
        assert_eq!(composer.feed(0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_story_is_not_found() {
        let composer = FeedComposer::new(Arc::new(MemoryStore::new()));
        let err = composer.story("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn recent_pages_of_four_returns_last_two_oldest_first() {
        let store = Arc::new(MemoryStore::new());
        let id = seed_story(&store, "a", 4).await;
        let composer = FeedComposer::new(store);

        let numbers: Vec<u32> = composer
            .recent_pages(&id, 2)
            .await
            .unwrap()
            .iter()
            .map(|p| p.page_number)
            .collect();
        assert_eq!(numbers, vec![3, 4]);
    }

    #[tokio::test]
    async fn recent_pages_clamps_to_available_pages() {
        let store = Arc::new(MemoryStore::new());
        let id = seed_story(&store, "a", 2).await;
        let composer = FeedComposer::new(store);

        let numbers: Vec<u32> = composer
            .recent_pages(&id, 50)
            .await
            .unwrap()
            .iter()
            .map(|p| p.page_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn created_since_filters_by_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let old = Story {
            created_at: Utc::now() - chrono::Duration::days(2),
            ..Story::new("old", "g", "t", None)
        };
        store.put_story(old).await.unwrap();
        seed_story(&store, "fresh", 1).await;
        let composer = FeedComposer::new(store);

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let recent = composer.created_since(cutoff).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "fresh");
    }
}
