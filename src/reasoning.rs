//! Reasoning service abstraction and implementations.
//!
//! The reasoning service turns one chunk of code plus a mode-specific
//! instruction into a JSON record. It is treated as an external, fallible
//! and slow collaborator: this module only performs one request per call;
//! retries, pacing and validation live in [`analyzer`](crate::analyzer).
//!
//! - **[`DisabledService`]**: always fails; used when no provider is configured.
//! - **[`OpenAiCompatibleService`]**: any OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint (Groq, OpenAI, vLLM,
//!   Ollama, ...), asking for structured output via `response_format`.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use code_eval::config::AnalyzerConfig;
//! # use code_eval::reasoning::create_service;
//! let mut config = AnalyzerConfig::default();
//! config.provider = "disabled".to_string();
//! let service = create_service(&config).unwrap();
//! assert_eq!(service.name(), "disabled");
//! ```

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::AnalyzerConfig;
use crate::error::ServiceError;
use crate::mode::AnalysisMode;

/// The external collaborator that produces one structured record per chunk.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Provider/model label used in logs.
    fn name(&self) -> &str;

    /// Send `content` with `instruction` and return the parsed JSON reply.
    /// The reply is not yet validated against the mode's schema.
    async fn complete(
        &self,
        instruction: &str,
        content: &str,
        mode: AnalysisMode,
    ) -> Result<Value, ServiceError>;
}

// ============ Disabled Service ============

pub struct DisabledService;

#[async_trait]
impl ReasoningService for DisabledService {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _instruction: &str,
        _content: &str,
        _mode: AnalysisMode,
    ) -> Result<Value, ServiceError> {
        Err(ServiceError::Disabled)
    }
}

// ============ OpenAI-compatible Service ============

/// Chat-completions client for OpenAI-compatible APIs.
///
/// Requires the API key in the environment variable named by
/// `analyzer.api_key_env` (default `GROQ_API_KEY`).
pub struct OpenAiCompatibleService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    strict_schema: bool,
}

impl OpenAiCompatibleService {
    /// # Errors
    ///
    /// Returns an error if the API key variable is not set or the HTTP
    /// client cannot be built.
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            strict_schema: config.response_format == "json_schema",
        })
    }

    fn request_body(&self, instruction: &str, content: &str, mode: AnalysisMode) -> Value {
        let (system, response_format) = if self.strict_schema {
            (
                instruction.to_string(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": format!("{}_record", mode.cache_name()),
                        "schema": mode.response_schema(),
                        "strict": true
                    }
                }),
            )
        } else {
            (
                format!(
                    "{}\n\nThe reply must be JSON conforming to this schema:\n{}",
                    instruction,
                    mode.response_schema()
                ),
                json!({ "type": "json_object" }),
            )
        };

        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": content }
            ],
            "response_format": response_format
        })
    }
}

#[async_trait]
impl ReasoningService for OpenAiCompatibleService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        instruction: &str,
        content: &str,
        mode: AnalysisMode,
    ) -> Result<Value, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(instruction, content, mode))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Extract and parse the JSON record from a chat-completions response.
fn parse_chat_response(json: &Value) -> Result<Value, ServiceError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Malformed("missing choices[0].message.content".into()))?;

    serde_json::from_str(strip_code_fence(content))
        .map_err(|e| ServiceError::Malformed(format!("reply is not JSON: {}", e)))
}

/// Some models wrap JSON in a Markdown fence even in JSON mode.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Create the [`ReasoningService`] selected by `analyzer.provider`.
///
/// | Config Value | Service |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledService`] |
/// | `"openai"` | [`OpenAiCompatibleService`] |
pub fn create_service(config: &AnalyzerConfig) -> Result<Arc<dyn ReasoningService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledService)),
        "openai" => Ok(Arc::new(OpenAiCompatibleService::new(config)?)),
        other => bail!("Unknown analyzer provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = json!({
            "choices": [{ "message": { "content": "{\"description\": \"parses CSV input\"}" } }]
        });
        let value = parse_chat_response(&json).unwrap();
        assert_eq!(value["description"], "parses CSV input");
    }

    #[test]
    fn test_parse_fenced_reply() {
        let json = json!({
            "choices": [{ "message": { "content": "```json\n{\"description\": \"x\"}\n```" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap()["description"], "x");
    }

    #[test]
    fn test_parse_malformed_reply() {
        let missing = json!({ "choices": [] });
        assert!(matches!(
            parse_chat_response(&missing),
            Err(ServiceError::Malformed(_))
        ));
        let not_json = json!({ "choices": [{ "message": { "content": "sure, here you go" } }] });
        assert!(matches!(
            parse_chat_response(&not_json),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_service_refuses() {
        let service = DisabledService;
        let err = service
            .complete("i", "c", AnalysisMode::Descriptive)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Disabled));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_create_service_requires_api_key() {
        let config = AnalyzerConfig {
            api_key_env: "CEVAL_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..AnalyzerConfig::default()
        };
        assert!(create_service(&config).is_err());
    }

    #[test]
    fn test_request_body_carries_schema() {
        let service = OpenAiCompatibleService {
            client: reqwest::Client::new(),
            endpoint: "http://localhost/chat/completions".into(),
            model: "m".into(),
            api_key: "k".into(),
            temperature: 0.0,
            strict_schema: true,
        };
        let body = service.request_body("inst", "fn main() {}", AnalysisMode::Security);
        assert_eq!(body["messages"][1]["content"], "fn main() {}");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert!(body["response_format"]["json_schema"]["schema"]["properties"]
            .get("cryptography")
            .is_some());
    }
}
