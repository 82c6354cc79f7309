#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use taskgate_api::config::ServerConfig;
use taskgate_api::router::build_app_router;
use taskgate_api::state::AppState;
use taskgate_broker::MemoryBroker;
use taskgate_core::message::result_channel;
use taskgate_core::task::Task;
use tower::ServiceExt;

/// Queue key produced by [`test_config`].
pub const TEST_QUEUE: &str = "sgnet:tasks";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a short task timeout and two catalog models.
pub fn test_config() -> ServerConfig {
    ServerConfig::from_lookup(|var| match var {
        "HOST" => Some("127.0.0.1".into()),
        "PORT" => Some("0".into()),
        "TASK_TIMEOUT" => Some("300".into()),
        "REQUEST_TIMEOUT_SECS" => Some("5".into()),
        "MODELS" => Some("llama3,mistral".into()),
        _ => None,
    })
    .expect("test configuration is valid")
}

/// Build the full application router on top of an in-memory broker.
///
/// Goes through [`build_app_router`] so integration tests exercise the same
/// middleware stack (CORS, request ID, timeout, tracing, panic recovery)
/// that production uses.
pub fn build_test_app(broker: Arc<MemoryBroker>) -> Router {
    let config = test_config();
    let state = AppState::new(config.clone(), broker);
    build_app_router(state, &config)
}

/// Spawn a fake worker that takes one task from the queue and publishes
/// `replies(&task)` on its result channel, a few milliseconds apart.
///
/// Returns a handle resolving to the task the worker received.
pub fn spawn_worker<F>(broker: Arc<MemoryBroker>, replies: F) -> tokio::task::JoinHandle<Task>
where
    F: FnOnce(&Task) -> Vec<String> + Send + 'static,
{
    tokio::spawn(async move {
        let raw = loop {
            if let Some(raw) = broker.pop_task(TEST_QUEUE) {
                break raw;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        let task: Task = serde_json::from_str(&raw).expect("queued task is valid JSON");
        let channel = result_channel(&task.task_id);

        for reply in replies(&task) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            broker.publish(&channel, reply);
        }
        task
    })
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
