use std::time::Duration;

use conform_core::{ConformError, LlmConfig, ModelHealth, ModelStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Deadline for the model backend health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// A message in a chat conversation with the model.
///
/// # Examples
///
/// ```
/// use conform_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Is FR-1 implemented?");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// System-level instruction message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use conform_review::llm::Role;
///
/// assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Ollama-compatible chat client.
///
/// Talks to `{host}/api/tags` for health and `{host}/api/chat` for
/// non-streaming completions.
///
/// # Examples
///
/// ```
/// use conform_core::LlmConfig;
/// use conform_review::LlmClient;
///
/// let client = LlmClient::new(&LlmConfig::default()).unwrap();
/// assert_eq!(client.model(), "codellama:7b-instruct");
/// ```
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, ConformError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConformError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.host.trim_end_matches('/'))
    }

    /// Probe the model server. Failures are reported in the returned value.
    pub async fn health(&self) -> ModelHealth {
        let response = match self
            .client
            .get(self.url("/api/tags"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_connect() => {
                return ModelHealth::unavailable(
                    ModelStatus::Disconnected,
                    self.model(),
                    "Cannot connect to model server",
                )
            }
            Err(e) => return ModelHealth::unavailable(ModelStatus::Error, self.model(), e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return ModelHealth::unavailable(
                ModelStatus::Error,
                self.model(),
                format!("model server returned {status}"),
            );
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let available: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                ModelHealth {
                    status: ModelStatus::Connected,
                    model: self.model().to_string(),
                    models_loaded: available.len(),
                    primary_model_available: available.iter().any(|m| m == self.model()),
                    available_models: available,
                    error: None,
                }
            }
            Err(e) => ModelHealth::unavailable(
                ModelStatus::Error,
                self.model(),
                format!("failed to parse model list: {e}"),
            ),
        }
    }

    /// Send a chat request and return the assistant's text.
    ///
    /// Timed-out requests are retried until `max_retries` attempts have been
    /// made; any other failure is returned immediately.
    ///
    /// # Errors
    ///
    /// - [`ConformError::Timeout`] when every attempt timed out
    /// - [`ConformError::Llm`] on connection, HTTP or parsing failures
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ConformError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": 0.1 },
        });
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            debug!(attempt, model = %self.config.model, "sending chat request");
            let response = match self.client.post(self.url("/api/chat")).json(&body).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    warn!(attempt, attempts, "model request timed out");
                    continue;
                }
                Err(e) if e.is_connect() => {
                    return Err(ConformError::Llm("model server unavailable".into()))
                }
                Err(e) => return Err(ConformError::Llm(format!("request failed: {e}"))),
            };

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                return Err(ConformError::Llm(format!(
                    "model API error {status}: {body_text}"
                )));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| ConformError::Llm(format!("failed to parse response: {e}")))?;
            return Ok(parsed.message.map(|m| m.content).unwrap_or_default());
        }

        Err(ConformError::Timeout {
            operation: "model request".into(),
            seconds: self.config.timeout_secs,
        })
    }
}
