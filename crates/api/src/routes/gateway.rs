use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{gateway, models};
use crate::state::AppState;

/// Task submission and model catalog routes, mounted under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(gateway::generate))
        .route("/chat", post(gateway::chat))
        .route("/tags", get(models::list_tags))
        .route("/ps", get(models::list_running))
}
