//! Host-side request execution.
//!
//! # Responsibilities
//! - Accept request descriptors and run them through the [`HttpFetcher`]
//! - Enforce per-request timeouts
//! - Serve cancellation, buffered body reads and stream starts
//!
//! # Design Decisions
//! - The entry is registered before the fetch starts, so a cancel that
//!   arrives mid-fetch finds it
//! - Fetch, timer and token race inside one `select!`; the timer is dropped
//!   with the select and can never fire after resolution
//! - Every failure path removes the entry before returning

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::HostConfig;
use crate::host::fetcher::{FetchCall, FetchFailure, FetchedResponse, HttpFetcher};
use crate::host::pump;
use crate::host::registry::Registry;
use crate::observability::metrics;
use crate::protocol::{
    BridgeError, BridgeResult, ErrorCode, HostMessage, RequestDescriptor, RequestId,
    ResponseMetadata,
};

/// Executor tunables derived from [`HostConfig`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Applied when a descriptor carries no timeout of its own.
    pub default_timeout: Option<Duration>,
    /// Upper bound on one pushed chunk.
    pub max_chunk_bytes: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&HostConfig::default())
    }
}

impl From<&HostConfig> for ExecutorSettings {
    fn from(config: &HostConfig) -> Self {
        Self {
            default_timeout: (config.default_timeout_ms > 0)
                .then(|| Duration::from_millis(config.default_timeout_ms)),
            max_chunk_bytes: config.max_chunk_bytes,
        }
    }
}

enum Resolution {
    Aborted,
    TimedOut,
    Fetched(Result<FetchedResponse, FetchFailure>),
}

/// Executes requests on behalf of one connected client.
#[derive(Clone)]
pub struct HostExecutor {
    registry: Registry,
    fetcher: Arc<dyn HttpFetcher>,
    settings: ExecutorSettings,
}

impl HostExecutor {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, settings: ExecutorSettings) -> Self {
        Self {
            registry: Registry::new(),
            fetcher,
            settings,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Perform the request and return its response head.
    pub async fn accept(&self, descriptor: RequestDescriptor) -> BridgeResult<ResponseMetadata> {
        let start = Instant::now();
        let timeout = descriptor.timeout().or(self.settings.default_timeout);
        let call = FetchCall::from(&descriptor);
        let entry = self.registry.insert(descriptor);
        let id = entry.id().clone();
        let token = entry.token().clone();

        tracing::debug!(
            request_id = %id,
            method = %call.method,
            url = %call.url,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Request accepted"
        );

        let deadline = async move {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        let resolution = tokio::select! {
            biased;
            _ = token.cancelled() => Resolution::Aborted,
            _ = deadline => Resolution::TimedOut,
            result = self.fetcher.fetch(call, token.clone()) => Resolution::Fetched(result),
        };

        match resolution {
            Resolution::TimedOut => {
                token.cancel();
                self.registry.remove(&id);
                metrics::record_cancellation("timeout");
                metrics::record_request("timeout", start);
                tracing::warn!(request_id = %id, elapsed_ms = start.elapsed().as_millis() as u64, "Request timed out");
                Err(BridgeError::timeout())
            }
            Resolution::Aborted | Resolution::Fetched(Err(FetchFailure::Cancelled)) => {
                self.registry.remove(&id);
                metrics::record_request("aborted", start);
                tracing::debug!(request_id = %id, "Request aborted before response");
                Err(BridgeError::aborted())
            }
            Resolution::Fetched(Err(e)) => {
                self.registry.remove(&id);
                metrics::record_request("error", start);
                tracing::warn!(request_id = %id, error = %e, "Request failed");
                Err(BridgeError::new(ErrorCode::FetchRequestError, e.to_string()))
            }
            Resolution::Fetched(Ok(response)) => {
                let metadata = ResponseMetadata {
                    request_id: id.clone(),
                    status: response.status,
                    status_text: response.status_text,
                    url: response.url,
                    headers: response.headers,
                };
                entry.attach_response(response.body).await;

                if token.is_cancelled() {
                    self.registry.remove(&id);
                    metrics::record_request("aborted", start);
                    return Err(BridgeError::aborted());
                }

                metrics::record_request("ok", start);
                tracing::info!(
                    request_id = %id,
                    status = metadata.status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Response received"
                );
                Ok(metadata)
            }
        }
    }

    /// Abort a request. Unknown ids are ignored.
    pub fn cancel(&self, id: &RequestId) {
        if self.registry.cancel(id) {
            metrics::record_cancellation("client");
            tracing::debug!(request_id = %id, "Request cancelled");
        } else {
            tracing::trace!(request_id = %id, "Cancel for unknown request ignored");
        }
    }

    /// Read the whole body. The entry is gone afterwards, whatever the outcome.
    pub async fn get_body(&self, id: &RequestId) -> BridgeResult<Bytes> {
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| BridgeError::id_not_found(id))?;
        if !entry.has_response() {
            return Err(BridgeError::response_not_found(id));
        }

        let token = entry.token().clone();
        let mut body = entry.body().await;
        let _remove = RemoveOnDrop {
            registry: &self.registry,
            id,
        };
        if entry.is_retired() {
            return Err(if token.is_cancelled() {
                BridgeError::aborted()
            } else {
                BridgeError::id_not_found(id)
            });
        }

        let Some(reader) = body.as_mut() else {
            return Ok(Bytes::new());
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(BridgeError::aborted()),
            result = reader.read_all() => result.map_err(|e| {
                tracing::warn!(request_id = %id, error = %e, "Body read failed");
                BridgeError::new(ErrorCode::BodyError, e.to_string())
            }),
        }
    }

    /// Relay the body as chunk pushes, ending with one terminator.
    pub async fn stream(&self, id: RequestId, out: &mpsc::Sender<HostMessage>) -> pump::Terminator {
        pump::run(&self.registry, id, self.settings.max_chunk_bytes, out).await
    }

    /// Cancel every live request.
    pub fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        for _ in 0..cancelled {
            metrics::record_cancellation("shutdown");
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled in-flight requests");
        }
    }
}

struct RemoveOnDrop<'a> {
    registry: &'a Registry,
    id: &'a RequestId,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
