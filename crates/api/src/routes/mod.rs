pub mod gateway;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generate    POST   submit a generate task
/// /chat        POST   submit a chat task
/// /tags        GET    configured model catalog
/// /ps          GET    configured model catalog
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(gateway::router())
}
