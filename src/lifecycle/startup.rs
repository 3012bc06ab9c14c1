//! Host startup and the connection accept loop.
//!
//! # Responsibilities
//! - Build the shared HTTP client from configuration
//! - Bind the listener
//! - Serve each connection with a framed transport and its own executor
//! - Drain connections on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One executor (and registry) per connection; closing a connection
//!   cancels everything it started

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::BridgeConfig;
use crate::host::{ExecutorSettings, FetchFailure, HostExecutor, HostServer, HttpFetcher, ReqwestFetcher};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::transport::framed;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to build HTTP client: {0}")]
    Fetcher(#[from] FetchFailure),
}

/// A bound host, ready to accept client connections.
pub struct HostRuntime {
    config: BridgeConfig,
    listener: Listener,
    fetcher: Arc<dyn HttpFetcher>,
    tracker: ConnectionTracker,
}

impl HostRuntime {
    /// Bind using the reqwest-backed fetcher.
    pub async fn bind(config: BridgeConfig) -> Result<Self, StartupError> {
        let fetcher = ReqwestFetcher::new(&config.host)?;
        Self::bind_with_fetcher(config, Arc::new(fetcher)).await
    }

    /// Bind with a caller-supplied fetcher.
    pub async fn bind_with_fetcher(
        config: BridgeConfig,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Result<Self, StartupError> {
        let listener = Listener::bind(&config.listener).await?;
        Ok(Self {
            config,
            listener,
            fetcher,
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: &Shutdown) {
        let mut stop = shutdown.subscribe();
        let settings = ExecutorSettings::from(&self.config.host);

        loop {
            let accepted = tokio::select! {
                _ = stop.recv() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let guard = self.tracker.track();
            let endpoint = framed::host_endpoint(stream, &self.config.transport);
            let executor = HostExecutor::new(Arc::clone(&self.fetcher), settings.clone());
            let connection_shutdown = shutdown.subscribe();

            tokio::spawn(async move {
                let _permit = permit;
                let connection_id = guard.id();
                tracing::info!(connection_id = %connection_id, peer_addr = %peer_addr, "Client connected");
                HostServer::new(executor).serve(endpoint, connection_shutdown).await;
                tracing::info!(connection_id = %connection_id, "Client disconnected");
                drop(guard);
            });
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );
        if !self.tracker.drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain deadline reached"
            );
        }
    }
}
