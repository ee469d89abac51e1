use super::{CompletionRequest, LlmClient, LlmError, LlmSettings};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    url: String,
    api_key: String,
    api_version: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let Some(api_key) = settings.api_key.clone().filter(|key| !key.trim().is_empty()) else {
            bail!("Anthropic API key must be provided via CREDIT_SCAN_API_KEY");
        };
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));
        let mut builder = Client::builder().user_agent(concat!("credit-scan/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .context("failed to build Anthropic HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key,
            api_version: settings
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let payload = AnthropicRequest {
            model: &self.model,
            system: &request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.user,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, body));
        }

        let message: AnthropicResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Malformed(err.to_string()))?;
        Ok(message
            .content
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn base_settings(url: String) -> LlmSettings {
        LlmSettings {
            provider: "anthropic".into(),
            api_key: Some("test-key".into()),
            endpoint: Some(url),
            model: Some("claude-test".into()),
            timeout_secs: Some(5),
            api_version: None,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "system".into(),
            user: "user".into(),
            max_tokens: 64,
            temperature: 0.3,
        }
    }

    #[test]
    fn defaults_model_and_version() {
        let mut settings = base_settings("http://localhost".into());
        settings.model = None;
        let client = AnthropicClient::new(&settings).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.api_version, DEFAULT_API_VERSION);
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn complete_joins_text_parts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", DEFAULT_API_VERSION);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"content":[{"type":"text","text":"Metro 2 Violation: a"},{"type":"text","text":"FCRA Violation: b"}]}"#);
        });

        let client = AnthropicClient::new(&base_settings(server.base_url())).unwrap();
        let content = client.complete(&request()).await.unwrap();
        assert_eq!(content, "Metro 2 Violation: a\nFCRA Violation: b");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn does_not_retry_on_failure() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(500);
        });

        let client = AnthropicClient::new(&base_settings(server.base_url())).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("completion API error"));
        mock.assert_hits(1);
    }
}
