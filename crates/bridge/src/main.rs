use anyhow::Context as _;
use apibridge_mcp::config::{CollisionPolicy, load_config};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Expose OpenAPI-described HTTP APIs as MCP tools over stdio.
#[derive(Debug, Parser)]
#[command(name = "apibridge-mcp", version, about)]
struct Args {
    /// YAML configuration file. Without one, the RSS3 APIs are served.
    #[arg(long, env = "APIBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// OpenAPI document URL or path (repeatable). Replaces the configured sources.
    #[arg(long = "spec", value_name = "URL_OR_PATH")]
    specs: Vec<String>,

    /// How to handle two operations mapping to the same tool name.
    #[arg(long, value_enum, env = "APIBRIDGE_COLLISION_POLICY")]
    collision_policy: Option<CollisionPolicy>,

    /// Log level (ignored when RUST_LOG is set).
    #[arg(long, env = "APIBRIDGE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, env = "APIBRIDGE_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(level: &str, format: LogFormat) {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let mut config = load_config(args.config.as_deref()).context("load configuration")?;
    config.apply_overrides(&args.specs, args.collision_policy);
    config.validate().context("validate configuration")?;

    tracing::info!(
        sources = config.sources.len(),
        policy = ?config.collision_policy,
        "starting apibridge-mcp"
    );

    apibridge_mcp::run(config).await.context("serve MCP")
}
