//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`. Non-streaming only: a decision is one JSON reply.

use std::time::Duration;

use async_trait::async_trait;
use rustedcode_config::ProviderConfig;
use rustedcode_core::error::ProviderError;
use rustedcode_core::message::{Message, Role};
use rustedcode_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Used when a 429 carries no usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from the `[provider]` config section.
    ///
    /// A key is required unless the endpoint is local (Ollama, vLLM).
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None if is_local(&config.base_url) => "local".to_string(),
            None => {
                return Err(ProviderError::NotConfigured(
                    "no API key: set provider.api_key, RUSTEDCODE_API_KEY or OPENAI_API_KEY"
                        .into(),
                ));
            }
        };
        Self::new(
            config.name.clone(),
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn parse_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage,
            model: api_response.model,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(status_error(status, error_body, retry_after));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::parse_response(api_response)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(status_error(status, String::new(), None));
        }
        Ok(response.status().is_success())
    }
}

fn is_local(base_url: &str) -> bool {
    base_url.contains("://localhost") || base_url.contains("://127.0.0.1")
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Map a non-200 HTTP status into a provider error.
fn status_error(status: u16, body: String, retry_after: Option<u64>) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

// ── OpenAI API types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1/",
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn constructor_trims_base_url() {
        let p = provider();
        assert_eq!(p.name(), "openai");
        assert_eq!(p.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn from_config_requires_key_for_remote() {
        let config = ProviderConfig::default();
        assert!(matches!(
            OpenAiCompatProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let local = ProviderConfig {
            base_url: "http://localhost:11434/v1".into(),
            ..ProviderConfig::default()
        };
        assert!(OpenAiCompatProvider::from_config(&local).is_ok());
    }

    #[test]
    fn message_conversion() {
        let msgs = vec![Message::system("Be precise"), Message::user("Hello")];
        let api = OpenAiCompatProvider::to_api_messages(&msgs);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].content.as_deref(), Some("Hello"));
    }

    #[test]
    fn request_body_json_mode() {
        let mut request = ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        request.max_tokens = Some(100);
        request.json_mode = true;
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parse_completion_response() {
        let api: ApiResponse = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{ "message": { "role": "assistant", "content": "{\"ok\":true}" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        }))
        .unwrap();
        let response = OpenAiCompatProvider::parse_response(api).unwrap();
        assert_eq!(response.message.content, "{\"ok\":true}");
        assert_eq!(response.message.role, Role::Assistant);
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_choices_is_error() {
        let api: ApiResponse =
            serde_json::from_value(serde_json::json!({ "model": "m", "choices": [] })).unwrap();
        assert!(OpenAiCompatProvider::parse_response(api).is_err());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, String::new(), Some(30)),
            ProviderError::RateLimited { retry_after_secs: 30 }
        ));
        assert!(matches!(
            status_error(429, String::new(), None),
            ProviderError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            status_error(401, String::new(), None),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(500, "oops".into(), None),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }
}
