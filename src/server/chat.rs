//! POST /chat 与 POST /chat/stream

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::server::{ApiError, AppState};
use crate::workflow::{ChatInput, WorkflowEvent};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let output = state
        .services
        .workflow
        .run(ChatInput::new(req.user_id, req.message))
        .await?;
    Ok(Json(ChatResponse {
        response: output.response,
    }))
}

/// 把工作流事件映射为 SSE：每次回答更新一条 response，最后 done 或 error
fn to_sse(ev: WorkflowEvent) -> Option<Event> {
    match ev {
        WorkflowEvent::Response { text } => Some(Event::default().event("response").data(text)),
        WorkflowEvent::Done { output } => Some(
            Event::default()
                .event("done")
                .json_data(&output)
                .unwrap_or_else(|_| Event::default().event("done").data("{}")),
        ),
        WorkflowEvent::Error { message } => Some(Event::default().event("error").data(message)),
        _ => None,
    }
}

pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "message is required"));
    }
    let events = Arc::clone(&state.services.workflow)
        .stream(ChatInput::new(req.user_id, req.message))
        .filter_map(|ev| async move { to_sse(ev).map(Ok) });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
