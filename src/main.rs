//! POP3 proxy server.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                   POP3 PROXY                     │
//!                  │                                                  │
//!   Mail client    │  ┌──────────┐   ┌──────────────┐   ┌──────────┐  │   Upstream
//!   ───────────────┼─▶│  client  │──▶│   session    │──▶│ upstream │──┼──▶ POP3
//!                  │  │ reactor  │   │ client.rs /  │   │  socket  │  │    server
//!                  │  └──────────┘   │ server.rs    │◀──│          │◀─┼───
//!                  │                 └──────┬───────┘   └──────────┘  │
//!                  │                        │ RETR capture            │
//!                  │                        ▼                         │
//!                  │                 ┌──────────────┐                 │
//!                  │                 │   pipeline   │                 │
//!                  │                 │ leet/rotate  │                 │
//!                  │                 └──────────────┘                 │
//!                  │                                                  │
//!   Admin          │  ┌──────────┐   ┌──────────────────────────────┐ │
//!   ───────────────┼─▶│  admin   │──▶│ registry · flags · stats ·   │ │
//!                  │  │ reactor  │   │ stop flag                    │ │
//!                  │  └──────────┘   └──────────────────────────────┘ │
//!                  └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use pop3_proxy::config::{load_config, watcher::ConfigWatcher, ProxyConfig};
use pop3_proxy::lifecycle::signals;
use pop3_proxy::observability::{logging, metrics};
use pop3_proxy::Proxy;

#[derive(Parser)]
#[command(name = "pop3-proxy")]
#[command(about = "Transparent POP3 proxy with message transformations", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("pop3-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        client_address = %config.listener.client_address,
        admin_address = %config.listener.admin_address,
        upstream = %format!("{}:{}", config.upstream.host, config.upstream.port),
        workers = config.pipeline.workers,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let running = Proxy::bind(&config).await?.run()?;
    let context = running.context().clone();

    // Hot reload of the default upstream and the admin password.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let reload_context = context.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    reload_context.apply_reload(&new_config);
                }
            });
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let signal_context = context.clone();
    tokio::spawn(async move {
        signals::termination().await;
        signal_context.shutdown.trigger();
    });

    running.wait().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
