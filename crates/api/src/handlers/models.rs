//! Model catalog handlers.
//!
//! The gateway does not track which models workers actually serve; both
//! endpoints report the configured catalog.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// One catalog entry, in the shape Ollama clients expect.
#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<ModelEntry>,
}

/// GET /api/tags
pub async fn list_tags(State(state): State<AppState>) -> Json<ModelList> {
    Json(model_list(&state))
}

/// GET /api/ps
pub async fn list_running(State(state): State<AppState>) -> Json<ModelList> {
    Json(model_list(&state))
}

fn model_list(state: &AppState) -> ModelList {
    let models = state
        .config
        .models
        .iter()
        .map(|name| ModelEntry {
            name: name.clone(),
            model: name.clone(),
        })
        .collect();

    ModelList { models }
}
