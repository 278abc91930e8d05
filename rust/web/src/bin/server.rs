//! Connect-four match server binary
//!
//! Usage: cargo run -p fourline-web --bin fourline-server -- --port 8080

use clap::Parser;
use fourline_web::config::{self, ConfigOverrides};
use fourline_web::{init_logging, LogFormat, WebServer};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "fourline-server", version, about = "Real-time connect-four match server")]
struct Args {
    /// Interface to bind
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (0 picks a free port)
    #[arg(long, short)]
    port: Option<u16>,
    /// SQLite file for sessions, results and events
    #[arg(long)]
    database: Option<PathBuf>,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(format)?;

    let overrides = ConfigOverrides {
        config_file: args.config,
        host: args.host,
        port: args.port,
        database: args.database,
    };
    let config = config::load(&overrides).inspect_err(|err| {
        error!(error = %err, "invalid configuration");
    })?;

    let server = WebServer::new(config).inspect_err(|err| {
        error!(error = %err, "failed to open result store");
    })?;
    let handle = server.start().await?;
    info!(address = %handle.address(), "press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await?;

    Ok(())
}
