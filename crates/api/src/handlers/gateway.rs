//! Task submission handlers for `POST /api/generate` and `POST /api/chat`.
//!
//! Both assign a fresh task id, build the task record, append it to the
//! work queue and then either stream partial results back as NDJSON
//! (`stream: true`) or wait for a single result under the configured
//! task timeout.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use taskgate_broker::CorrelationError;
use taskgate_core::task::{ChatRequest, GenerateRequest, Task};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Content type of streamed responses.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/generate
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let task = Task::generate(new_task_id(), request)?;

    tracing::info!(
        task_id = %task.task_id,
        provider = %task.provider,
        model = %task.model,
        stream = task.stream,
        prompt = %task.prompt_preview(),
        "Generate request received",
    );

    submit(&state, task).await
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let task = Task::chat(new_task_id(), request)?;

    tracing::info!(
        task_id = %task.task_id,
        provider = %task.provider,
        model = %task.model,
        stream = task.stream,
        messages = task.message_count(),
        prompt = %task.prompt_preview(),
        "Chat request received",
    );

    submit(&state, task).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// Dispatch `task` and hand back the response for its delivery mode.
///
/// The result subscription opens after the task is queued, so a worker that
/// answers before then goes unheard.
async fn submit(state: &AppState, task: Task) -> AppResult<Response> {
    state.dispatcher.enqueue(&task).await?;

    if task.stream {
        stream_response(state, &task.task_id).await
    } else {
        blocking_response(state, &task.task_id).await
    }
}

async fn stream_response(state: &AppState, task_id: &str) -> AppResult<Response> {
    let chunks = state.relay.open_stream(task_id).await?;

    Ok(([(CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(chunks)).into_response())
}

async fn blocking_response(state: &AppState, task_id: &str) -> AppResult<Response> {
    let timeout = state.config.broker.task_timeout;

    match state.correlator.await_result(task_id, timeout).await {
        Ok(result) => Ok(Json(result).into_response()),
        Err(CorrelationError::Decode(e)) => {
            tracing::warn!(task_id, error = %e, "Returning undecodable result verbatim");
            Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], e.raw).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
