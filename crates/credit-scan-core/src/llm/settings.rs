use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;

/// Optional `[llm]` table from a config file. Environment variables win over it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LlmFileSettings {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_version: Option<String>,
}

/// Environment-driven configuration for completion clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: String,
    /// `None` puts the scanner in static (offline) mode.
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_version: Option<String>,
}

impl LlmSettings {
    const PROVIDER_ENV: &'static str = "CREDIT_SCAN_PROVIDER";
    const API_KEY_ENV: &'static str = "CREDIT_SCAN_API_KEY";
    const OPENAI_KEY_ENV: &'static str = "OPENAI_API_KEY";
    const ENDPOINT_ENV: &'static str = "CREDIT_SCAN_ENDPOINT";
    const MODEL_ENV: &'static str = "CREDIT_SCAN_MODEL";
    const TIMEOUT_ENV: &'static str = "CREDIT_SCAN_TIMEOUT_SECS";
    const API_VERSION_ENV: &'static str = "CREDIT_SCAN_API_VERSION";

    /// Load settings from environment variables.
    ///
    /// * `CREDIT_SCAN_PROVIDER` — `openai` (default), `anthropic` or `noop`.
    /// * `CREDIT_SCAN_API_KEY`  — API key; falls back to `OPENAI_API_KEY`. Absent means offline.
    /// * `CREDIT_SCAN_ENDPOINT` — Optional custom base URL.
    pub fn from_env() -> Result<Self> {
        Self::from_sources(std::env::vars().collect(), &LlmFileSettings::default())
    }

    /// Environment variables layered over file settings.
    pub fn from_env_with(file: &LlmFileSettings) -> Result<Self> {
        Self::from_sources(std::env::vars().collect(), file)
    }

    fn from_sources(vars: HashMap<String, String>, file: &LlmFileSettings) -> Result<Self> {
        let var = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let provider = var(Self::PROVIDER_ENV)
            .or_else(|| file.provider.clone())
            .unwrap_or_else(|| "openai".to_string());
        let api_key = var(Self::API_KEY_ENV)
            .or_else(|| file.api_key.clone().filter(|v| !v.trim().is_empty()))
            .or_else(|| var(Self::OPENAI_KEY_ENV));
        let timeout_secs = match var(Self::TIMEOUT_ENV) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|err| {
                anyhow::anyhow!("{} must be a whole number of seconds: {err}", Self::TIMEOUT_ENV)
            })?),
            None => file.timeout_secs,
        };

        Ok(Self {
            provider,
            api_key,
            endpoint: var(Self::ENDPOINT_ENV).or_else(|| file.endpoint.clone()),
            model: var(Self::MODEL_ENV).or_else(|| file.model.clone()),
            timeout_secs,
            api_version: var(Self::API_VERSION_ENV).or_else(|| file.api_version.clone()),
        })
    }
}
