use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tracing::info;

use super::error::ApiResult;
use super::state::AppState;
use crate::engine::{validate_query, StreamEvent};
use crate::error::RagError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub index_loaded: bool,
    pub tier: Option<String>,
    pub documents: usize,
}

/// Liveness plus whether an index is being served.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        index_loaded: state.is_loaded(),
        tier: state.tier.map(|t| t.to_string()),
        documents: state.engine.as_ref().map_or(0, |e| e.document_count()),
    })
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload?;
    let query = validate_query(&request.message).map_err(RagError::from)?.to_string();
    let engine = state.engine()?;

    info!(chars = query.len(), "chat request");
    let answer = state.pool.run(async move { engine.answer(&query).await }).await?;
    Ok(Json(ChatResponse { response: answer.text }))
}

/// Server-sent events: `{text}` per chunk, then a `done` event, or a single
/// `error` event carrying `{error}`.
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let query = validate_query(&request.message).map_err(RagError::from)?.to_string();
    let engine = state.engine()?;

    info!(chars = query.len(), "streamed chat request");
    let receiver = state.pool.spawn_stream(engine, query).await?;
    Ok(Sse::new(sse_events(receiver)).keep_alive(KeepAlive::default()))
}

fn sse_events(
    receiver: tokio::sync::mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(receiver, |mut receiver| async move {
        let event = match receiver.recv().await? {
            StreamEvent::Chunk(text) => Event::default().data(json!({ "text": text }).to_string()),
            StreamEvent::Done => Event::default().event("done").data("{}"),
            StreamEvent::Error(message) => Event::default()
                .event("error")
                .data(json!({ "error": message }).to_string()),
        };
        Some((Ok(event), receiver))
    })
}
