use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Story metadata. Immutable after creation except `likes_count`, which only
/// the consistency guard adjusts, and `current_page_number`, which tracks page
/// ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub story_id: String,
    pub title: String,
    pub genre: String,
    pub tone: String,
    pub cover_image_url: Option<String>,
    pub likes_count: u32,
    pub current_page_number: u32,
    pub created_at: DateTime<Utc>,
}

impl Story {
    pub fn new(
        title: impl Into<String>,
        genre: impl Into<String>,
        tone: impl Into<String>,
        cover_image_url: Option<String>,
    ) -> Self {
        Self {
            story_id: Uuid::new_v4().to_string(),
            title: title.into(),
            genre: genre.into(),
            tone: tone.into(),
            cover_image_url,
            likes_count: 0,
            current_page_number: 0,
            created_at: Utc::now(),
        }
    }
}

/// A single story page. Page numbers are positive and unique per story;
/// pages are never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub story_id: String,
    pub page_number: u32,
    pub content: String,
}

/// One row of the like ledger. Existence of the row is the sole source of
/// truth for "user likes story"; the denormalized `likes_count` is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeRelation {
    pub user_id: String,
    pub story_id: String,
    pub created_at: DateTime<Utc>,
}

impl LikeRelation {
    pub fn new(user_id: impl Into<String>, story_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            story_id: story_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Feed payload shape: story metadata paired with its full ordered page list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryWithPages {
    pub metadata: Story,
    pub pages: Vec<Page>,
}

/// One entry of a user's likes listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikedStory {
    pub story_id: String,
    pub liked_at: DateTime<Utc>,
    pub story: Story,
}
