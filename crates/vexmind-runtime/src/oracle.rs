//! [`Oracle`] – the reasoning boundary – and [`OpenAiOracle`], a client for
//! any OpenAI-compatible `/v1/chat/completions` endpoint (Groq, Ollama,
//! vLLM, …).
//!
//! The orchestrator asks the oracle two kinds of question:
//!
//! - free-text completions through [`Oracle::think`], tagged with an
//!   `intent` that only serves logging (`"goal-decision"`,
//!   `"command-generation"`, …);
//! - a structured scene analysis through [`Oracle::process_environment`],
//!   constrained by a JSON Schema generated from [`SceneAnalysis`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vexmind_runtime::oracle::{ChatMessage, OpenAiOracle, Oracle, ThinkRequest};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let oracle = OpenAiOracle::new(
//!     "https://api.groq.com/openai",
//!     "llama3-8b-8192",
//!     Duration::from_secs(10),
//! )?
//! .with_api_key("gsk_...");
//!
//! let reply = oracle
//!     .think(ThinkRequest::new("smoke-test", vec![ChatMessage::user("Say hi")]))
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use vexmind_types::VexError;

use crate::scene::SceneRef;

pub const DEFAULT_MODEL: &str = "llama3-8b-8192";
pub const COMMAND_MODEL: &str = "llama-3.2-3b-preview";
pub const VISION_MODEL: &str = "llama-3.2-90b-vision-preview";

const SCENE_PROMPT: &str = "\
Describe the environment in one or two sentences. Then list, as short \
imperative objectives, what a small wheeled robot with an arm and a claw \
should do next, taking into account the objects you see, their approximate \
distances (far, medium, close) and their positions (left, right, front).";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    #[error("Oracle returned no content")]
    Empty,
}

impl From<OracleError> for VexError {
    fn from(e: OracleError) -> Self {
        VexError::OracleUnavailable(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user message carrying a prompt and an image reference.
    pub fn user_with_image(prompt: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// All text carried by the message, parts joined by newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A free-text completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkRequest {
    /// Short tag naming why the call is made; used for logging only.
    pub intent: String,
    pub messages: Vec<ChatMessage>,
    /// Overrides the oracle's default model.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ThinkRequest {
    pub fn new(intent: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            intent: intent.into(),
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Text of every message, concatenated.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Structured output of [`Oracle::process_environment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneAnalysis {
    /// One or two sentences describing what the camera sees.
    pub description: String,
    /// Concrete sub-tasks for the robot, in execution order.
    pub objectives: Vec<String>,
}

impl SceneAnalysis {
    /// Parse model output, falling back to a single objective equal to the
    /// raw text when it is not the expected JSON.
    pub fn from_content(content: &str) -> Self {
        let trimmed = content.trim();
        match serde_json::from_str::<SceneAnalysis>(trimmed) {
            Ok(analysis) => analysis,
            Err(e) => {
                debug!(error = %e, "scene analysis was not structured; using raw text");
                Self {
                    description: trimmed.to_string(),
                    objectives: if trimmed.is_empty() {
                        Vec::new()
                    } else {
                        vec![trimmed.to_string()]
                    },
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Oracle trait
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Free-text completion.  Empty replies are [`OracleError::Empty`].
    async fn think(&self, request: ThinkRequest) -> Result<String, OracleError>;

    /// Describe `scene` and derive objectives from it.
    async fn process_environment(&self, scene: &SceneRef) -> Result<SceneAnalysis, OracleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: serde_json::Value,
}

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn scene_response_format() -> ResponseFormat {
    let schema =
        serde_json::to_value(schema_for!(SceneAnalysis)).unwrap_or(serde_json::Value::Null);
    ResponseFormat {
        kind: "json_schema",
        json_schema: JsonSchemaFormat {
            name: "scene_analysis",
            schema,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAiOracle
// ─────────────────────────────────────────────────────────────────────────────

/// Async client for an OpenAI-compatible chat-completions endpoint.
///
/// Every request is bounded by the timeout given at construction.
pub struct OpenAiOracle {
    base_url: String,
    model: String,
    vision_model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiOracle {
    /// Create a client for `base_url` (without the `/v1/...` suffix) using
    /// `model` for requests that do not name one.
    ///
    /// # Errors
    ///
    /// [`OracleError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            vision_model: VISION_MODEL.to_string(),
            api_key: None,
            client,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, body: &ChatRequest<'_>) -> Result<String, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::BadResponse("empty choices array".into()))?
            .message
            .content
            .unwrap_or_default();

        let content = content.trim();
        if content.is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn think(&self, request: ThinkRequest) -> Result<String, OracleError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        debug!(intent = %request.intent, model, "oracle request");
        let body = ChatRequest {
            model,
            messages: &request.messages,
            stream: false,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: None,
        };
        self.complete(&body).await.inspect_err(|e| {
            warn!(intent = %request.intent, error = %e, "oracle call failed");
        })
    }

    async fn process_environment(&self, scene: &SceneRef) -> Result<SceneAnalysis, OracleError> {
        let uri = scene.to_data_uri();
        debug!(image = %uri.chars().take(50).collect::<String>(), "processing environment");
        let messages = [ChatMessage::user_with_image(SCENE_PROMPT, uri.as_ref())];
        let body = ChatRequest {
            model: &self.vision_model,
            messages: &messages,
            stream: false,
            temperature: Some(0.7),
            max_tokens: Some(512),
            response_format: Some(scene_response_format()),
        };
        let content = self.complete(&body).await.inspect_err(|e| {
            warn!(error = %e, "error processing environment");
        })?;
        Ok(SceneAnalysis::from_content(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serializes_as_plain_string() {
        let json = serde_json::to_value(ChatMessage::system("hello")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn image_message_serializes_as_content_parts() {
        let msg = ChatMessage::user_with_image("what is here?", "data:image/jpeg;base64,AA");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "what is here?");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AA"
        );
        assert_eq!(msg.text(), "what is here?");
    }

    #[test]
    fn request_body_omits_unset_options() {
        let messages = [ChatMessage::user("hi")];
        let body = ChatRequest {
            model: DEFAULT_MODEL,
            messages: &messages,
            stream: false,
            temperature: None,
            max_tokens: Some(64),
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("response_format").is_none());
        assert_eq!(json["max_tokens"], 64);
        assert_eq!(json["model"], "llama3-8b-8192");
    }

    #[test]
    fn scene_schema_is_injected_into_response_format() {
        let json = serde_json::to_value(scene_response_format()).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["json_schema"]["name"], "scene_analysis");
        let schema = json["json_schema"]["schema"].to_string();
        assert!(schema.contains("objectives"));
        assert!(schema.contains("description"));
    }

    #[test]
    fn structured_scene_content_is_parsed() {
        let analysis = SceneAnalysis::from_content(
            r#"{"description":"A hallway.","objectives":["drive forward","turn left"]}"#,
        );
        assert_eq!(analysis.objectives, vec!["drive forward", "turn left"]);
    }

    #[test]
    fn unstructured_scene_content_becomes_single_objective() {
        let analysis = SceneAnalysis::from_content("  A red ball close on the left.  ");
        assert_eq!(analysis.objectives, vec!["A red ball close on the left."]);
        assert!(SceneAnalysis::from_content("   ").objectives.is_empty());
    }

    #[test]
    fn think_request_builder() {
        let req = ThinkRequest::new("goal-decision", vec![ChatMessage::user("go?")])
            .with_model(COMMAND_MODEL)
            .with_temperature(0.2)
            .with_max_tokens(32);
        assert_eq!(req.model.as_deref(), Some("llama-3.2-3b-preview"));
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(32));
        assert_eq!(req.prompt_text(), "go?");
    }

    #[test]
    fn oracle_error_maps_to_unavailable() {
        let err: VexError = OracleError::Empty.into();
        assert!(matches!(err, VexError::OracleUnavailable(_)));
    }

    #[test]
    fn empty_api_key_is_ignored() {
        let oracle = OpenAiOracle::new("http://localhost:11434/", "llama3", Duration::from_secs(1))
            .unwrap()
            .with_api_key("");
        assert!(oracle.api_key.is_none());
        assert_eq!(oracle.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let oracle =
            OpenAiOracle::new("http://127.0.0.1:1", DEFAULT_MODEL, Duration::from_secs(2)).unwrap();
        let err = oracle
            .think(ThinkRequest::new("test", vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Http(_)));
    }
}
