use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::stream::{Stream, StreamExt};
use parley_graph::{StreamEvent, TurnRequest};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::ApiResult, middleware::auth::AuthUser, state::AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    /// Route the turn to the reasoning model chain
    #[serde(default)]
    pub extra_reason: bool,
    /// Continue this thread; a new one is created when absent
    pub thread_id: Option<Uuid>,
    /// Replace this user message and everything after it
    pub edited_message_id: Option<Uuid>,
    pub language_preference: Option<String>,
}

impl From<ChatRequest> for TurnRequest {
    fn from(req: ChatRequest) -> Self {
        Self {
            prompt: req.prompt,
            extra_reason: req.extra_reason,
            thread_id: req.thread_id,
            edited_message_id: req.edited_message_id,
            language_preference: req.language_preference,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BranchOffResponse {
    pub thread_id: Uuid,
    pub message_ids: Vec<Uuid>,
}

/// Run one chat turn and stream it using Server-Sent Events
///
/// Event names match the `type` field of each payload: `init_stream`,
/// `reasoning`, `message`, `tool_call`, `tool_result`, `done`, `committed`,
/// `error`, `end_stream`.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Streaming response", content_type = "text/event-stream"),
        (status = 404, description = "Thread or edited message not found"),
        (status = 429, description = "Tenant message limit reached")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let receiver = state.orchestrator.start_turn(user, req.into()).await?;

    let sse_stream = ReceiverStream::new(receiver).map(|event| Ok::<Event, Infallible>(to_sse_event(&event)));

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::error!(event = event.event_name(), error = %e, "failed to serialize stream event");
            Event::default()
                .event("error")
                .data(r#"{"type":"error","message":"event serialization failed"}"#)
        })
}

/// Fork a thread at a message into a new thread
#[utoipa::path(
    put,
    path = "/chat/branch-off/{message_id}",
    params(("message_id" = Uuid, Path, description = "Last message to carry over")),
    responses(
        (status = 200, description = "New thread", body = BranchOffResponse),
        (status = 404, description = "Message not found")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn branch_off(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> ApiResult<Json<BranchOffResponse>> {
    let branched = state.persist.branch_off(&user, message_id).await?;

    Ok(Json(BranchOffResponse {
        thread_id: branched.thread.id,
        message_ids: branched.messages.iter().map(|m| m.id).collect(),
    }))
}
