//! Bookinfo server binary.
//!
//! Loads the TOML config (or the built-in defaults), decorates the in-memory
//! comments and details services, and serves them over HTTP until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bookinfo_server::network::{shutdown_on, NetworkModule};
use bookinfo_server::service::middleware::TracingSink;
use bookinfo_server::service::{ServerConfig, Services};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "bookinfo-server", version, about = "Bookinfo comments and details server")]
struct Args {
    /// Path to a TOML config file. Built-in defaults are used when omitted.
    #[arg(long, env = "BOOKINFO_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `network.host`.
    #[arg(long, env = "BOOKINFO_HOST")]
    host: Option<String>,

    /// Overrides `network.port`.
    #[arg(long, env = "BOOKINFO_PORT")]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "BOOKINFO_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bookinfo_server=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(host) = &args.host {
        config.network.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.network.host,
        port = config.network.port,
        "bookinfo-server starting"
    );

    let services = Services::in_memory(&config, Arc::new(TracingSink))
        .context("assembling endpoint pipelines")?;
    let mut module = NetworkModule::new(config.network, services.comments, services.details);
    let port = module.start().await?;
    info!(port, "listening");

    module
        .serve(shutdown_on(tokio::signal::ctrl_c()))
        .await?;

    info!("bookinfo-server stopped");
    Ok(())
}
