use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    Json,
};
use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{LikedStory, Page, Story, StoryWithPages};
use crate::state::AppState;

/// Header carrying the opaque authenticated user id. Identity is issued and
/// validated upstream (the fronting proxy / auth provider); this service
/// performs no authentication logic of its own.
pub const USER_ID_HEADER: &str = "x-user-id";

const DEFAULT_FEED_COUNT: usize = 10;
const DEFAULT_RECENT_PAGES: u32 = 2;

pub struct AuthedUser(pub String);

impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(|value| AuthedUser(value.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

#[derive(Deserialize)]
pub struct FeedRequest {
    count: Option<usize>,
}

#[derive(Deserialize)]
pub struct RecentParams {
    n: Option<String>,
}

#[derive(Deserialize)]
pub struct LikeRequest {
    story_id: Option<String>,
}

#[derive(Serialize)]
pub struct Ack {
    success: bool,
}

pub async fn stories_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<FeedRequest>>,
) -> Result<Json<Vec<StoryWithPages>>, AppError> {
    let count = body
        .and_then(|Json(req)| req.count)
        .unwrap_or(DEFAULT_FEED_COUNT);
    Ok(Json(state.feed.feed(count).await?))
}

pub async fn today_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Story>>, AppError> {
    let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
    Ok(Json(state.feed.created_since(midnight).await?))
}

pub async fn story_handler(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
) -> Result<Json<StoryWithPages>, AppError> {
    Ok(Json(state.feed.story(&story_id).await?))
}

pub async fn recent_pages_handler(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Page>>, AppError> {
    let n = match params.n {
        None => DEFAULT_RECENT_PAGES,
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| AppError::Validation("n must be a positive integer".into()))?,
    };
    Ok(Json(state.feed.recent_pages(&story_id, n).await?))
}

pub async fn like_handler(
    State(state): State<Arc<AppState>>,
    AuthedUser(user_id): AuthedUser,
    body: Option<Json<LikeRequest>>,
) -> Result<Json<Ack>, AppError> {
    let story_id = body
        .and_then(|Json(req)| req.story_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("story_id is required".into()))?;

    state.ledger.like(&user_id, &story_id).await?;
    Ok(Json(Ack { success: true }))
}

pub async fn unlike_handler(
    State(state): State<Arc<AppState>>,
    AuthedUser(user_id): AuthedUser,
    Path(story_id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    if story_id.trim().is_empty() {
        return Err(AppError::Validation("story_id is required".into()));
    }

    state.ledger.unlike(&user_id, &story_id).await?;
    Ok(Json(Ack { success: true }))
}

pub async fn my_likes_handler(
    State(state): State<Arc<AppState>>,
    AuthedUser(user_id): AuthedUser,
) -> Result<Json<Vec<LikedStory>>, AppError> {
    Ok(Json(state.ledger.user_likes(&user_id).await?))
}
