mod anthropic;
mod openai;
mod settings;

use std::{str::FromStr, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use settings::{LlmFileSettings, LlmSettings};

/// Provider-neutral completion request. The client supplies the model id.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Failures surfaced by completion clients.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The account behind the credential has no quota left; every further call will fail too.
    #[error("insufficient_quota: {0}")]
    QuotaExceeded(String),
    #[error("request to completion API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API error ({status}): {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Classify a non-success HTTP response.
    pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
        let lower = body.to_ascii_lowercase();
        if status == StatusCode::PAYMENT_REQUIRED
            || lower.contains("insufficient_quota")
            || lower.contains("credit balance is too low")
        {
            Self::QuotaExceeded(body)
        } else {
            Self::Api { status, body }
        }
    }
}

/// Client abstraction for a text-completion service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Run one completion. An empty string means the service answered with no content.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Supported completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    /// Never calls out; scans run in static mode.
    Noop,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "noop" | "none" | "offline" => Ok(Self::Noop),
            other => bail!("unsupported LLM provider `{other}` (expected openai, anthropic or noop)"),
        }
    }
}

/// Build the configured client, or `None` when scans should run offline.
pub fn client_from_settings(settings: &LlmSettings) -> Result<Option<Arc<dyn LlmClient>>> {
    let client: Arc<dyn LlmClient> = match settings.provider.parse::<ProviderKind>()? {
        ProviderKind::Noop => {
            info!("LLM provider set to noop; compliance scans use static violations");
            return Ok(None);
        }
        _ if settings.api_key.is_none() => {
            info!(provider = %settings.provider, "no LLM API key configured; compliance scans use static violations");
            return Ok(None);
        }
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(settings)?),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(settings)?),
    };
    info!(provider = %settings.provider, model = client.model(), "LLM client configured");
    Ok(Some(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str, api_key: Option<&str>) -> LlmSettings {
        LlmSettings {
            provider: provider.into(),
            api_key: api_key.map(str::to_string),
            endpoint: None,
            model: None,
            timeout_secs: None,
            api_version: None,
        }
    }

    #[test]
    fn parses_provider_names() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" anthropic ".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("noop".parse::<ProviderKind>().unwrap(), ProviderKind::Noop);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn missing_key_means_offline() {
        assert!(client_from_settings(&settings("openai", None)).unwrap().is_none());
    }

    #[test]
    fn noop_ignores_key() {
        assert!(client_from_settings(&settings("noop", Some("secret")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn builds_openai_with_default_model() {
        let client = client_from_settings(&settings("openai", Some("secret")))
            .unwrap()
            .expect("client should be configured");
        assert_eq!(client.model(), "gpt-3.5-turbo-1106");
    }

    #[test]
    fn classifies_quota_errors() {
        let err = LlmError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":"insufficient_quota"}}"#.into(),
        );
        assert!(matches!(err, LlmError::QuotaExceeded(_)));

        let err = LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, "rate limited".into());
        assert!(matches!(err, LlmError::Api { status, .. } if status == StatusCode::TOO_MANY_REQUESTS));

        let err = LlmError::from_status(StatusCode::PAYMENT_REQUIRED, String::new());
        assert!(matches!(err, LlmError::QuotaExceeded(_)));
    }
}
