use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use parley_persist::{HistoryRequest, PersistError, StoredMessage, Thread, ThreadCursor, ThreadQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{format_cursor, page_limit};
use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    state::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListThreadsQuery {
    /// `nextCursor` of the previous page
    pub cursor: Option<String>,
    /// Page size, 1..=100 (default 100)
    pub limit: Option<i64>,
    /// Case-insensitive title substring
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessagePageQuery {
    /// Only messages created strictly before this instant
    pub cursor: Option<DateTime<Utc>>,
    /// Page size, 1..=100 (default 100)
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResponse {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Thread> for ThreadResponse {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            title: thread.title,
            created_at: thread.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadResponse>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: String,
    /// The stored model message
    #[schema(value_type = Object)]
    pub content: Value,
    pub extra_reason: bool,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for MessageResponse {
    fn from(message: StoredMessage) -> Self {
        Self {
            id: message.id,
            role: message.role.as_str().to_string(),
            content: message.content,
            extra_reason: message.extra_reason,
            created_at: message.created_at,
        }
    }
}

/// Oldest first; `nextCursor` pages towards older messages.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageResponse {
    pub messages: Vec<MessageResponse>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RenameThreadRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteThreadsRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteThreadsResponse {
    pub deleted: Vec<Uuid>,
}

/// List the caller's threads, newest first
#[utoipa::path(
    get,
    path = "/thread",
    params(ListThreadsQuery),
    responses(
        (status = 200, description = "Page of threads", body = ThreadListResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<ThreadListResponse>> {
    let limit = page_limit(query.limit);
    let cursor = query
        .cursor
        .as_deref()
        .map(str::parse::<ThreadCursor>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let threads = state
        .persist
        .list_threads(
            &user,
            &ThreadQuery {
                cursor,
                limit,
                search: query.search.filter(|s| !s.trim().is_empty()),
            },
        )
        .await?;

    let next_cursor = if threads.len() as i64 == limit {
        threads.last().map(|t| ThreadCursor::after(t).to_string())
    } else {
        None
    };

    Ok(Json(ThreadListResponse {
        threads: threads.into_iter().map(ThreadResponse::from).collect(),
        next_cursor,
    }))
}

/// One page of a thread's messages
#[utoipa::path(
    get,
    path = "/thread/{thread_id}",
    params(
        ("thread_id" = Uuid, Path, description = "Thread ID"),
        MessagePageQuery
    ),
    responses(
        (status = 200, description = "Page of messages", body = MessagePageResponse),
        (status = 404, description = "Thread not found")
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(thread_id): Path<Uuid>,
    Query(query): Query<MessagePageQuery>,
) -> ApiResult<Json<MessagePageResponse>> {
    let limit = page_limit(query.limit);
    let request = HistoryRequest::new(user.slug.clone())
        .owned_by(user.id)
        .before(query.cursor)
        .limit(query.limit.map(|_| limit));

    let messages = match state.persist.history().load_full(thread_id, &request).await {
        Ok(messages) => messages,
        // Paging past the first message
        Err(PersistError::NotFound(_)) if query.cursor.is_some() => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let next_cursor = if messages.len() as i64 == limit {
        messages.first().map(|m| format_cursor(m.created_at))
    } else {
        None
    };

    Ok(Json(MessagePageResponse {
        messages: messages.into_iter().map(MessageResponse::from).collect(),
        next_cursor,
    }))
}

/// Rename a thread
#[utoipa::path(
    patch,
    path = "/thread/{thread_id}",
    params(("thread_id" = Uuid, Path, description = "Thread ID")),
    request_body = RenameThreadRequest,
    responses(
        (status = 200, description = "Renamed thread", body = ThreadResponse),
        (status = 400, description = "Title out of bounds"),
        (status = 404, description = "Thread not found")
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
pub async fn rename_thread(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<RenameThreadRequest>,
) -> ApiResult<Json<ThreadResponse>> {
    let thread = state.persist.rename_thread(&user, thread_id, &req.title).await?;
    Ok(Json(thread.into()))
}

/// Delete one thread and its messages
#[utoipa::path(
    delete,
    path = "/thread/{thread_id}",
    params(("thread_id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 204, description = "Thread deleted"),
        (status = 404, description = "Thread not found")
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = state.persist.delete_threads(&user, &[thread_id]).await?;
    if deleted.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Delete several threads; ids the caller does not own are skipped
#[utoipa::path(
    delete,
    path = "/thread",
    request_body = DeleteThreadsRequest,
    responses(
        (status = 200, description = "Ids actually deleted", body = DeleteThreadsResponse),
        (status = 400, description = "No ids given")
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
pub async fn delete_threads(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<DeleteThreadsRequest>,
) -> ApiResult<Json<DeleteThreadsResponse>> {
    if req.ids.is_empty() {
        return Err(ApiError::BadRequest("ids must not be empty".to_string()));
    }
    let deleted = state.persist.delete_threads(&user, &req.ids).await?;
    Ok(Json(DeleteThreadsResponse { deleted }))
}
