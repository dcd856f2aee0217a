//! JSON HTTP API for GENIE Connect.
//!
//! Thin axum layer over the library: handlers validate path/query input,
//! call into `profiles`, `posts`, `comments`, `reactions`, and map
//! `GenieError` onto status codes with a `{"error": ...}` body.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{header::CONTENT_TYPE, request::Parts, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::ai_client::AssistantClient;
use crate::comments::{self, CommentNode, NewComment};
use crate::db::{CommentRow, Database, PostFilter, Profile, ReactionState, UserStats};
use crate::error::GenieError;
use crate::hashtags::{self, WordCloudItem};
use crate::posts::{self, NewPost, PostCard};
use crate::reactions::{self, ViewerState};
use crate::resources::{self, Resource};
use crate::profiles;
use crate::utils::now_millis;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_HASHTAG_LIMIT: u32 = 30;

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub assistant: Arc<AssistantClient>,
    pub ai_limiter: Arc<DefaultDirectRateLimiter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(db: Arc<Database>, assistant: AssistantClient, ai_requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(ai_requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            db,
            assistant: Arc::new(assistant),
            ai_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Error type
// ============================================================================

pub struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

impl From<GenieError> for AppError {
    fn from(err: GenieError) -> Self {
        match err {
            GenieError::NotFound(msg) => AppError(StatusCode::NOT_FOUND, msg),
            GenieError::InvalidInput(msg) => AppError(StatusCode::BAD_REQUEST, msg),
            GenieError::Forbidden(msg) => AppError(StatusCode::FORBIDDEN, msg),
            GenieError::AiNotConfigured => AppError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            GenieError::AiUnavailable { .. } => AppError(StatusCode::BAD_GATEWAY, err.to_string()),
            GenieError::Http(e) => {
                error!("AI route error: {}", e);
                AppError(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong. Please try again.".to_string())
            }
            other => {
                error!("Request failed: {}", other);
                AppError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::BAD_REQUEST, msg.into())
}

// Malformed input is a 400; an oversized body keeps its 413.
fn rejection_status(status: StatusCode) -> StatusCode {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        status
    } else {
        StatusCode::BAD_REQUEST
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(rejection_status(rejection.status()), rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError(rejection_status(rejection.status()), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError(rejection_status(rejection.status()), rejection.body_text())
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// `Json` body whose rejection is an `AppError`
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Path` params whose rejection is an `AppError`
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

/// `Query` string whose rejection is an `AppError`
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct CreateProfileRequest {
    nickname: String,
    avatar_emoji: String,
}

#[derive(Deserialize)]
struct PatchProfileRequest {
    nickname: Option<String>,
    avatar_emoji: Option<String>,
}

#[derive(Deserialize)]
struct FeedQuery {
    hashtag: Option<String>,
    q: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct ViewerQuery {
    viewer: Option<i64>,
}

#[derive(Deserialize)]
struct DeleteQuery {
    profile_id: Option<i64>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct CreateCommentRequest {
    author_id: i64,
    parent_id: Option<i64>,
    content: String,
}

#[derive(Deserialize)]
struct ReactionRequest {
    profile_id: i64,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
}

#[derive(Serialize)]
struct PostDetail {
    post: PostCard,
    comments: Vec<CommentNode>,
    comment_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    viewer: Option<ViewerState>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    profiles: usize,
    posts: usize,
    comments: usize,
    uptime_secs: u64,
}

// ============================================================================
// Handlers
// ============================================================================

// GET /health
async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let (profiles, posts, comments) = state.db.get_stats().map_err(GenieError::from)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        profiles,
        posts,
        comments,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// POST /profiles
async fn create_profile_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let profile = profiles::create_profile(&state.db, &req.nickname, &req.avatar_emoji)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

// GET /profiles/{id}
async fn get_profile_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(profiles::get_profile(&state.db, id)?))
}

// PATCH /profiles/{id}
async fn patch_profile_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<PatchProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let existing = profiles::get_profile(&state.db, id)?;
    let nickname = req.nickname.unwrap_or(existing.nickname);
    let avatar_emoji = req.avatar_emoji.unwrap_or(existing.avatar_emoji);
    Ok(Json(profiles::update_profile(&state.db, id, &nickname, &avatar_emoji)?))
}

// GET /profiles/{id}/stats
async fn profile_stats_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserStats>, AppError> {
    Ok(Json(profiles::user_stats(&state.db, id)?))
}

// GET /profiles/{id}/posts
//
// Anonymous posts are listed only when the profile asks for its own posts.
async fn profile_posts_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<ViewerQuery>,
) -> Result<Json<Vec<PostCard>>, AppError> {
    profiles::get_profile(&state.db, id)?;
    let own = query.viewer == Some(id);
    let now = now_millis();
    let cards = posts::fetch_user_posts(&state.db, id)?
        .iter()
        .filter(|p| own || !p.is_anonymous)
        .map(|p| PostCard::from_post(p, now))
        .collect();
    Ok(Json(cards))
}

// GET /posts
async fn list_posts_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> Result<Json<Vec<PostCard>>, AppError> {
    let filter = PostFilter {
        hashtag: query.hashtag.filter(|h| !h.trim().is_empty()),
        query: query.q.filter(|q| !q.trim().is_empty()),
        author_id: None,
        limit: query.limit,
    };
    let now = now_millis();
    let cards = posts::fetch_posts(&state.db, &filter)?
        .iter()
        .map(|p| PostCard::from_post(p, now))
        .collect();
    Ok(Json(cards))
}

// POST /posts
async fn create_post_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewPost>,
) -> Result<(StatusCode, Json<PostCard>), AppError> {
    let post = posts::create_post(&state.db, req)?;
    Ok((StatusCode::CREATED, Json(PostCard::from_post(&post, now_millis()))))
}

// GET /posts/{id}
async fn get_post_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<ViewerQuery>,
) -> Result<Json<PostDetail>, AppError> {
    let post = posts::fetch_post(&state.db, id)?;
    let comments = comments::fetch_comment_tree(&state.db, id)?;
    let viewer = match query.viewer {
        Some(profile_id) => Some(reactions::viewer_state(&state.db, id, profile_id)?),
        None => None,
    };

    Ok(Json(PostDetail {
        post: PostCard::from_post(&post, now_millis()),
        comment_count: comments::count_replies(&comments),
        comments,
        viewer,
    }))
}

// DELETE /posts/{id}?profile_id=
async fn delete_post_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    let requester = query.profile_id.ok_or_else(|| bad_request("profile_id is required"))?;
    posts::delete_post(&state.db, id, requester)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /posts/{id}/comments
async fn list_comments_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<CommentNode>>, AppError> {
    posts::fetch_post(&state.db, id)?;
    Ok(Json(comments::fetch_comment_tree(&state.db, id)?))
}

// POST /posts/{id}/comments
async fn create_comment_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentRow>), AppError> {
    let comment = comments::create_comment(&state.db, NewComment {
        post_id: id,
        parent_id: req.parent_id,
        author_id: req.author_id,
        content: req.content,
    })?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// POST /posts/{id}/like
async fn like_post_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReactionRequest>,
) -> Result<Json<ReactionState>, AppError> {
    Ok(Json(reactions::toggle_like(&state.db, id, req.profile_id)?))
}

// POST /posts/{id}/helpful
async fn helpful_post_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReactionRequest>,
) -> Result<Json<ReactionState>, AppError> {
    Ok(Json(reactions::toggle_helpful(&state.db, id, req.profile_id)?))
}

// POST /comments/{id}/like
async fn like_comment_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReactionRequest>,
) -> Result<Json<ReactionState>, AppError> {
    Ok(Json(reactions::toggle_comment_like(&state.db, id, req.profile_id)?))
}

// GET /hashtags
async fn hashtags_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Vec<WordCloudItem>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HASHTAG_LIMIT);
    Ok(Json(hashtags::word_cloud(&state.db, limit)?))
}

// GET /resources
async fn resources_handler() -> Json<&'static [Resource]> {
    Json(resources::all())
}

// POST /api/ai
//
// Any body without a string `question` is "Question is required". Only
// requests that pass validation spend rate-limit budget.
async fn ask_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<AskResponse>, AppError> {
    let question = body.get("question").and_then(Value::as_str).unwrap_or_default();
    let question = state.assistant.check_question(question)?;

    if state.ai_limiter.check().is_err() {
        warn!("AI rate limit exceeded");
        return Err(AppError(StatusCode::TOO_MANY_REQUESTS, "Too many requests. Please try again shortly.".to_string()));
    }

    let answer = state.assistant.ask(question).await?;
    info!(chars = answer.chars().count(), "AI answer served");
    Ok(Json(AskResponse { answer }))
}

async fn not_found_handler() -> AppError {
    AppError(StatusCode::NOT_FOUND, "Not found".to_string())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health_handler))
        .route("/profiles", post(create_profile_handler))
        .route("/profiles/{id}", get(get_profile_handler).patch(patch_profile_handler))
        .route("/profiles/{id}/stats", get(profile_stats_handler))
        .route("/profiles/{id}/posts", get(profile_posts_handler))
        .route("/posts", get(list_posts_handler).post(create_post_handler))
        .route("/posts/{id}", get(get_post_handler).delete(delete_post_handler))
        .route("/posts/{id}/comments", get(list_comments_handler).post(create_comment_handler))
        .route("/posts/{id}/like", post(like_post_handler))
        .route("/posts/{id}/helpful", post(helpful_post_handler))
        .route("/comments/{id}/like", post(like_comment_handler))
        .route("/hashtags", get(hashtags_handler))
        .route("/resources", get(resources_handler))
        .route("/api/ai", post(ask_handler))
        .fallback(not_found_handler)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}
