use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use interpose::config::Config;
use interpose::proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "interpose")]
#[command(about = "An intercepting HTTP reverse proxy with a plugin hook pipeline")]
struct Args {
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file_with_env(&args.config).await?;
    if let Some(bind) = args.bind {
        config.server.bind = bind.to_string();
    }

    // Initialize tracing
    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("interpose={}", level))
        .init();

    info!("Starting interpose");
    info!("Loaded configuration from {}", args.config);

    let server = ProxyServer::new(config)?;

    // Setup graceful shutdown
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        warn!("Received CTRL+C, shutting down gracefully...");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!("Proxy server error: {}", e);
            }
        }
        _ = shutdown_signal => {
            info!("Shutdown signal received");
        }
    }

    info!("Interpose shutdown complete");
    Ok(())
}
