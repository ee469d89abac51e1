use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use credit_scan_core::{llm::LlmFileSettings, ScanConfig};
use serde::Deserialize;

const ENV_PREFIX: &str = "CREDIT_SCAN";
const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Everything the binary reads from the optional config file and
/// `CREDIT_SCAN_<SECTION>__<KEY>` environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmFileSettings,
    pub scan: ScanConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut app: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to parse configuration")?;

        if let Some(port) = std::env::var("PORT").ok().filter(|p| !p.trim().is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got {port:?}"))?;
            app.server.bind = with_port(&app.server.bind, port);
        }
        Ok(app)
    }
}

/// Replace the port of `bind`, keeping its host.
fn with_port(bind: &str, port: u16) -> String {
    let host = bind
        .rsplit_once(':')
        .map(|(host, _)| host)
        .filter(|host| !host.is_empty())
        .unwrap_or("0.0.0.0");
    format!("{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;

    #[test]
    fn file_values_override_defaults() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write(
            file.path(),
            "[llm]\nprovider = \"noop\"\nmodel = \"file-model\"\n\n[scan]\nbatch_size = 2\n\n[server]\nbind = \"127.0.0.1:8088\"\n",
        )
        .unwrap();

        let app = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(app.llm.provider.as_deref(), Some("noop"));
        assert_eq!(app.llm.model.as_deref(), Some("file-model"));
        assert_eq!(app.scan.batch_size, 2);
        assert_eq!(app.scan.max_item_tokens, 1_000);
        assert_eq!(app.server.bind, "127.0.0.1:8088");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/credit-scan.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("failed to build configuration"));
    }

    #[test]
    fn port_replaces_only_the_port() {
        assert_eq!(with_port("127.0.0.1:8088", 9000), "127.0.0.1:9000");
        assert_eq!(with_port("[::1]:80", 81), "[::1]:81");
        assert_eq!(with_port("localhost", 5001), "0.0.0.0:5001");
    }
}
