//! guardftp scan agent entry point.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use guardftp_agent_server::{AgentServer, CommandEngine};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "guardftp-agent")]
#[command(version, about = "Receives files over TCP and scans them with an external virus scanner")]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting guardftp scan agent"
    );

    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = Config::load(&path)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    tracing::info!(path = %path.display(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}

/// Serves until Ctrl-C or a fatal startup error.
async fn run(config: Config) -> anyhow::Result<()> {
    let engine = CommandEngine::new(config.engine_config());
    let server = AgentServer::new(config.server_config(), engine)?;

    let runner = Arc::clone(&server);
    let mut serve = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = &mut serve => {
            // Only reached when startup fails.
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            server.shutdown();
            serve.await??;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}
