use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use credit_scan_core::{
    client_from_settings, extract_items,
    report::{render_items, render_report, OutputFormat},
    ComplianceScanner, LlmSettings, ReportScanner,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod server;

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "credit-scan",
    author,
    version,
    about = "Credit report compliance scanner"
)]
struct Cli {
    /// Config file (TOML, YAML or JSON) with [llm], [scan] and [server] tables
    #[arg(long, value_name = "FILE", env = "CREDIT_SCAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on; overrides [server].bind and PORT
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Scan a credit report JSON file
    Scan {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Human)]
        format: Format,
    },
    /// List the disputable items extracted from a report
    Items {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Emit items as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Human,
    Json,
    Yaml,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => OutputFormat::Human,
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let app = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| app.server.bind.clone());
            let scanner = build_scanner(&app)?;
            server::serve(&bind, scanner).await?;
        }
        Commands::Scan { file, format } => {
            let report = read_report(&file).await?;
            let scanner = build_scanner(&app)?;
            let response = scanner
                .scan(&report)
                .await
                .with_context(|| format!("scan of {} failed", file.display()))?;
            print!("{}", render_report(&response, format.into())?);
        }
        Commands::Items { file, json } => {
            let report = read_report(&file).await?;
            let items = extract_items(
                &report,
                Utc::now().date_naive(),
                app.scan.inquiry_lookback_months,
            );
            let format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            };
            println!("{}", render_items(&items, format)?.trim_end());
        }
    }
    Ok(())
}

fn build_scanner(app: &AppConfig) -> Result<Arc<dyn ReportScanner>> {
    let settings = LlmSettings::from_env_with(&app.llm)?;
    let client = client_from_settings(&settings)?;
    Ok(Arc::new(ComplianceScanner::with_config(
        client,
        app.scan.clone(),
    )))
}

async fn read_report(path: &Path) -> Result<Value> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a valid credit report JSON document", path.display()))
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
