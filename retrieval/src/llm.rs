//! Language model client.
//!
//! The pipeline hands the client an assembled context and the user's
//! question; prompt wording lives here, not in the router.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::ModelError;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Model used when none is chosen.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Models known to work with the default endpoint.
pub const KNOWN_MODELS: &[&str] = &[
    "meta-llama/llama-3.3-70b-instruct",
    "mistralai/ministral-8b",
    "google/gemini-flash-1.5",
    "deepseek/deepseek-chat",
];

const ASSISTANT_PERSONA: &str = "You are ScholarDigest, an assistant that summarizes and explains \
academic papers. Answer clearly and concisely, keep technical terms to what the reader's level \
needs, and give context that helps understanding instead of repeating the text.";

/// How technical the answer should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalLevel {
    Elementary,
    HighSchool,
    Undergrad,
    #[default]
    DomainExpert,
}

impl TechnicalLevel {
    pub const ALL: [TechnicalLevel; 4] = [
        TechnicalLevel::Elementary,
        TechnicalLevel::HighSchool,
        TechnicalLevel::Undergrad,
        TechnicalLevel::DomainExpert,
    ];

    /// Human-readable label used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            TechnicalLevel::Elementary => "elementary",
            TechnicalLevel::HighSchool => "high school",
            TechnicalLevel::Undergrad => "undergrad",
            TechnicalLevel::DomainExpert => "domain expert",
        }
    }
}

impl fmt::Display for TechnicalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TechnicalLevel {
    type Err = String;

    /// Accepts labels with spaces, underscores or hyphens, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', '-'], " ");
        Self::ALL
            .into_iter()
            .find(|level| level.label() == wanted)
            .ok_or_else(|| format!("unknown technical level: {s}"))
    }
}

/// Everything a language model needs to answer one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub context: String,
    pub question: String,
    pub technical_level: TechnicalLevel,
    pub model_id: String,
}

/// A service that turns context and a question into answer text.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ChatCompletionsClient {
    /// Create a client for the default endpoint, reading the key from
    /// `OPENROUTER_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Create a client for the endpoint in `config`.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new().with_base_url(config.base_url.clone())
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn messages(request: &GenerationRequest) -> serde_json::Value {
        let system = format!(
            "{ASSISTANT_PERSONA}\nTechnical level: {}\n\nUse the following material to answer \
             the question where it applies:\n{}",
            request.technical_level, request.context
        );
        let user = format!(
            "{}\nPlease give your answer at a {} level.",
            request.question, request.technical_level
        );
        serde_json::json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user }
        ])
    }
}

impl Default for ChatCompletionsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModelClient for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let api_key = self.api_key.as_ref().ok_or(ModelError::NotConfigured)?;

        debug!(
            "Requesting answer from {} ({} context chars)",
            request.model_id,
            request.context.chars().count()
        );

        let body = serde_json::json!({
            "model": request.model_id,
            "messages": Self::messages(request),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    ModelError::Http(e)
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                return Err(ModelError::Auth {
                    status: status.as_u16(),
                });
            }
            402 | 429 => return Err(ModelError::Quota),
            _ if !status.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(ModelError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let answer = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        info!("Received answer from {} ({} chars)", request.model_id, answer.len());
        Ok(answer)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            context: "[Source: 10.1000/xyz]\nPlants convert light into sugar.".to_string(),
            question: "What do plants make?".to_string(),
            technical_level: TechnicalLevel::Elementary,
            model_id: DEFAULT_MODEL.to_string(),
        }
    }

    fn client(server: &MockServer) -> ChatCompletionsClient {
        ChatCompletionsClient::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
    }

    #[test]
    fn test_technical_level_parsing() {
        assert_eq!("high school".parse::<TechnicalLevel>(), Ok(TechnicalLevel::HighSchool));
        assert_eq!("Domain_Expert".parse::<TechnicalLevel>(), Ok(TechnicalLevel::DomainExpert));
        assert_eq!("undergrad".parse::<TechnicalLevel>(), Ok(TechnicalLevel::Undergrad));
        assert!("professor".parse::<TechnicalLevel>().is_err());
        assert_eq!(TechnicalLevel::default(), TechnicalLevel::DomainExpert);
    }

    #[test]
    fn test_default_model_is_known() {
        assert!(KNOWN_MODELS.contains(&DEFAULT_MODEL));
    }

    #[test]
    fn test_messages_carry_context_and_level() {
        let messages = ChatCompletionsClient::messages(&request());
        let system = messages[0]["content"].as_str().unwrap();
        let user = messages[1]["content"].as_str().unwrap();

        assert!(system.contains("Plants convert light into sugar."));
        assert!(system.contains("Technical level: elementary"));
        assert_eq!(
            user,
            "What do plants make?\nPlease give your answer at a elementary level."
        );
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({ "model": DEFAULT_MODEL })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Sugar." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client(&server).generate(&request()).await.unwrap();
        assert_eq!(answer, "Sugar.");
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "Glucose." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config: crate::RetrievalConfig =
            toml::from_str(&format!("[model]\nbase_url = \"{}/\"\n", server.uri())).unwrap();
        let client = ChatCompletionsClient::from_config(&config.model).with_api_key("test-key");

        assert_eq!(client.generate(&request()).await.unwrap(), "Glucose.");
    }

    #[tokio::test]
    async fn test_auth_and_quota_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(matches!(
            client.generate(&request()).await,
            Err(ModelError::Auth { status: 401 })
        ));
        assert!(matches!(
            client.generate(&request()).await,
            Err(ModelError::Quota)
        ));
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let result = client(&server).generate(&request()).await;
        assert!(matches!(result, Err(ModelError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let result = client(&server)
            .with_timeout(Duration::from_millis(100))
            .generate(&request())
            .await;
        assert!(matches!(result, Err(ModelError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = ChatCompletionsClient {
            api_key: None,
            ..ChatCompletionsClient::new()
        };
        let result = client.generate(&request()).await;
        assert!(matches!(result, Err(ModelError::NotConfigured)));
    }
}
