//! Task records submitted to the work queue.
//!
//! A [`Task`] is built once by a request handler from a
//! [`GenerateRequest`] or [`ChatRequest`], tagged with its [`TaskKind`]
//! and a caller-assigned id, and never mutated afterwards. Its serde
//! representation is the wire format consumed by workers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of prompt characters included in request logs.
pub const PROMPT_PREVIEW_CHARS: usize = 500;

/// Keys owned by the gateway. Passthrough fields with these names are
/// dropped so a client cannot override the task identity.
const RESERVED_FIELDS: &[&str] = &["taskId", "type"];

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// Discriminates the work a task asks for. Workers switch on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Generate,
    Chat,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Generate => "generate",
            TaskKind::Chat => "chat",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/generate`.
///
/// Unknown fields (`options`, `format`, `system`, ...) are captured in
/// `extra` and forwarded to the worker untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work as it is appended to the queue.
///
/// Serializes to `{"taskId", "type", "provider", "model", "prompt"?,
/// "messages"?, "stream", ...passthrough}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Build a `generate` task from a validated request body.
    pub fn generate(task_id: impl Into<String>, request: GenerateRequest) -> Result<Self, CoreError> {
        validate_target(&request.provider, &request.model)?;
        if request.prompt.is_none() {
            return Err(CoreError::Validation(
                "Generate requests require a prompt".to_string(),
            ));
        }

        Ok(Self {
            task_id: task_id.into(),
            kind: TaskKind::Generate,
            provider: request.provider,
            model: request.model,
            prompt: request.prompt,
            messages: None,
            stream: request.stream,
            extra: strip_reserved(request.extra),
        })
    }

    /// Build a `chat` task from a validated request body.
    pub fn chat(task_id: impl Into<String>, request: ChatRequest) -> Result<Self, CoreError> {
        validate_target(&request.provider, &request.model)?;
        let has_messages = request.messages.as_ref().is_some_and(|m| !m.is_empty());
        if request.prompt.is_none() && !has_messages {
            return Err(CoreError::Validation(
                "Chat requests require a prompt or a non-empty messages array".to_string(),
            ));
        }

        Ok(Self {
            task_id: task_id.into(),
            kind: TaskKind::Chat,
            provider: request.provider,
            model: request.model,
            prompt: request.prompt,
            messages: request.messages,
            stream: request.stream,
            extra: strip_reserved(request.extra),
        })
    }

    /// The prompt truncated to [`PROMPT_PREVIEW_CHARS`] characters, for logs.
    pub fn prompt_preview(&self) -> String {
        self.prompt
            .as_deref()
            .map(|p| p.chars().take(PROMPT_PREVIEW_CHARS).collect())
            .unwrap_or_default()
    }

    /// Number of chat messages carried by the task (0 for generate).
    pub fn message_count(&self) -> usize {
        self.messages.as_ref().map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Naming / validation helpers
// ---------------------------------------------------------------------------

/// Name of the work queue shared by all task kinds: `<namespace>:<set>`.
///
/// An empty namespace yields the bare set name.
pub fn queue_key(namespace: &str, set: &str) -> String {
    if namespace.is_empty() {
        set.to_string()
    } else {
        format!("{namespace}:{set}")
    }
}

/// Validate that both routing fields are present.
pub fn validate_target(provider: &str, model: &str) -> Result<(), CoreError> {
    if provider.trim().is_empty() {
        return Err(CoreError::Validation("provider must not be empty".to_string()));
    }
    if model.trim().is_empty() {
        return Err(CoreError::Validation("model must not be empty".to_string()));
    }
    Ok(())
}

fn strip_reserved(mut extra: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_FIELDS {
        extra.remove(*key);
    }
    extra
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn generate_body(value: Value) -> GenerateRequest {
        serde_json::from_value(value).expect("valid generate body")
    }

    fn chat_body(value: Value) -> ChatRequest {
        serde_json::from_value(value).expect("valid chat body")
    }

    #[test]
    fn generate_task_serializes_wire_format() {
        let request = generate_body(json!({
            "provider": "x",
            "model": "m",
            "prompt": "hi",
            "stream": false,
        }));
        let task = Task::generate("t1", request).unwrap();

        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(
            wire,
            json!({
                "taskId": "t1",
                "type": "generate",
                "provider": "x",
                "model": "m",
                "prompt": "hi",
                "stream": false,
            })
        );
    }

    #[test]
    fn passthrough_fields_are_flattened() {
        let request = generate_body(json!({
            "provider": "ollama",
            "model": "llama3",
            "prompt": "hi",
            "options": {"temperature": 0.2},
            "keep_alive": "5m",
        }));
        let task = Task::generate("t2", request).unwrap();

        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(wire["options"]["temperature"], 0.2);
        assert_eq!(wire["keep_alive"], "5m");
        assert_eq!(wire["stream"], false);
    }

    #[test]
    fn reserved_passthrough_fields_cannot_override_identity() {
        let request = chat_body(json!({
            "provider": "ollama",
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "taskId": "spoofed",
            "type": "generate",
        }));
        let task = Task::chat("real-id", request).unwrap();

        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(wire["taskId"], "real-id");
        assert_eq!(wire["type"], "chat");
    }

    #[test]
    fn chat_task_keeps_messages_and_omits_missing_prompt() {
        let request = chat_body(json!({
            "provider": "ollama",
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true,
        }));
        let task = Task::chat("t3", request).unwrap();

        assert_eq!(task.kind, TaskKind::Chat);
        assert_eq!(task.message_count(), 1);
        let wire = serde_json::to_value(&task).unwrap();
        assert!(wire.get("prompt").is_none());
        assert_eq!(wire["stream"], true);
    }

    #[test]
    fn generate_requires_prompt() {
        let request = generate_body(json!({"provider": "x", "model": "m"}));
        assert_matches!(Task::generate("t", request), Err(CoreError::Validation(_)));
    }

    #[test]
    fn chat_requires_prompt_or_messages() {
        let request = chat_body(json!({"provider": "x", "model": "m", "messages": []}));
        assert_matches!(Task::chat("t", request), Err(CoreError::Validation(_)));

        let request = chat_body(json!({"provider": "x", "model": "m", "prompt": "hi"}));
        assert!(Task::chat("t", request).is_ok());
    }

    #[test]
    fn blank_provider_or_model_is_rejected() {
        assert_matches!(validate_target(" ", "m"), Err(CoreError::Validation(_)));
        assert_matches!(validate_target("x", ""), Err(CoreError::Validation(_)));
        assert!(validate_target("x", "m").is_ok());
    }

    #[test]
    fn prompt_preview_truncates_on_char_boundary() {
        let request = generate_body(json!({
            "provider": "x",
            "model": "m",
            "prompt": "é".repeat(PROMPT_PREVIEW_CHARS + 10),
        }));
        let task = Task::generate("t", request).unwrap();
        assert_eq!(task.prompt_preview().chars().count(), PROMPT_PREVIEW_CHARS);
    }

    #[test]
    fn queue_key_joins_namespace_and_set() {
        assert_eq!(queue_key("sgnet", "tasks"), "sgnet:tasks");
        assert_eq!(queue_key("", "llm_tasks"), "llm_tasks");
    }
}
