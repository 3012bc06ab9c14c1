//! fetch-bridge host
//!
//! Performs HTTP requests on behalf of network-restricted clients.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                 FETCH-BRIDGE HOST                 │
//!                        │                                                   │
//!   Client process       │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ─────────────────────┼─▶│   net   │──▶│transport │──▶│ host server  │   │
//!     (framed TCP)       │  │listener │   │ framed   │   │ (per conn)   │   │
//!                        │  └─────────┘   └──────────┘   └──────┬───────┘   │
//!                        │                                      ▼           │
//!                        │                ┌──────────┐   ┌──────────────┐   │
//!                        │                │ registry │◀──│   executor   │───┼──▶ Upstream
//!                        │                └────┬─────┘   └──────────────┘   │    (reqwest)
//!                        │                     ▼                            │
//!   ◀────────────────────┼──── chunks ──── stream pump                      │
//!                        │                                                   │
//!                        │   config · observability · lifecycle             │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use fetch_bridge::config::load_or_default;
use fetch_bridge::lifecycle::{shutdown_signal, HostRuntime, Shutdown};
use fetch_bridge::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = load_or_default(config_path.as_deref())?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fetch-bridge host starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        default_timeout_ms = config.host.default_timeout_ms,
        max_redirects = config.host.max_redirects,
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

    let runtime = HostRuntime::bind(config).await?;
    tracing::info!(address = %runtime.local_addr()?, "Listening for clients");

    let shutdown = Shutdown::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.trigger();
        }
    });

    runtime.run(&shutdown).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
