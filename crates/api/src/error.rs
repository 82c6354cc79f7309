use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use taskgate_broker::{CorrelationError, EnqueueError, RelayError};
use taskgate_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and the broker-side failures of
/// each gateway step. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `taskgate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The task could not be appended to the work queue.
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    /// No usable result arrived on the blocking path.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The result stream could not be opened.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Core(core) => internal(core),

            // --- Gateway steps ---
            AppError::Enqueue(EnqueueError::Broker(err)) => {
                tracing::error!(error = %err, "Enqueue failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENQUEUE_FAILED",
                    "Failed to enqueue task".to_string(),
                )
            }
            AppError::Enqueue(err) => internal(err),

            AppError::Correlation(CorrelationError::Timeout { task_id, timeout }) => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!(
                    "Task {task_id} timed out after {} ms",
                    timeout.as_millis()
                ),
            ),
            AppError::Correlation(CorrelationError::Subscribe(err))
            | AppError::Relay(RelayError::Subscribe(err)) => {
                tracing::error!(error = %err, "Result subscription failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SUBSCRIBE_FAILED",
                    "Failed to subscribe to task results".to_string(),
                )
            }
            AppError::Correlation(err) => {
                tracing::error!(error = %err, "Task result failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RESULT_FAILED",
                    "Task did not produce a usable result".to_string(),
                )
            }
            AppError::Relay(err) => internal(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Log `err` and produce the sanitized 500 triple.
fn internal(err: &dyn std::error::Error) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
