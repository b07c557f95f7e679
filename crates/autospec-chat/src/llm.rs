//! Language model clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use autospec_core::config::LlmConfig;
use autospec_core::error::{AutoSpecError, Result};

/// A text-in, text-out language model.
///
/// Failures of any kind (transport, quota, malformed or empty output) are
/// reported as [`AutoSpecError::Generation`].
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire format
/// (Gemini's compatibility endpoint, LM Studio, Ollama, vLLM).
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    client: Client,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutoSpecError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            api_key,
            client,
        })
    }

    /// Build a client from the `[llm]` section, reading the API key from the
    /// environment variable it names.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "No API key set; requests will be sent unauthenticated"
            );
        }
        Self::new(
            &config.base_url,
            &config.model,
            config.temperature,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream: false,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| AutoSpecError::Generation(format!("request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(AutoSpecError::Generation(format!(
                "{} returned {status}: {}",
                self.model,
                text.trim()
            )));
        }

        let payload: ChatCompletionResponse = res
            .json()
            .await
            .map_err(|e| AutoSpecError::Generation(format!("malformed response: {e}")))?;

        let content = parse_content(payload)?;
        debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }
}

fn parse_content(payload: ChatCompletionResponse) -> Result<String> {
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(AutoSpecError::Generation(
            "model returned an empty completion".to_string(),
        ));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<String> {
        parse_content(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_content() {
        let json = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"  Use 5W-30.\n"}}]}"#;
        assert_eq!(parse(json).unwrap(), "Use 5W-30.");
    }

    #[test]
    fn test_parse_empty_choices() {
        let err = parse(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, AutoSpecError::Generation(_)));
        assert!(parse(r#"{}"#).is_err());
    }

    #[test]
    fn test_parse_null_or_blank_content() {
        assert!(parse(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(parse(r#"{"choices":[{"message":{"content":"   "}}]}"#).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatCompletionRequest {
            model: "gemini-2.5-flash",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.0,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gemini-2.5-flash");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAiCompatibleClient::new(
            "http://localhost:1234/v1/",
            "local-model",
            0.0,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(client.name(), "local-model");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        // Port 9 (discard) on localhost is closed on test machines.
        let client = OpenAiCompatibleClient::new(
            "http://127.0.0.1:9/v1",
            "m",
            0.0,
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, AutoSpecError::Generation(_)));
        assert!(err.is_retryable());
    }
}
