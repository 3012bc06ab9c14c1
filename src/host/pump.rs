//! Stream pump: relays one response body as ordered chunk pushes.
//!
//! # Data Flow
//! ```text
//! start-stream(id)
//!     → registry lookup (ID_NOT_FOUND / RESPONSE_NOT_FOUND terminators)
//!     → body reader (locked for the whole stream)
//!     → chunk* → stream-end | stream-error
//! ```
//!
//! Exactly one terminator is pushed per start-stream, always last. The entry
//! is removed before the terminator goes out.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::host::registry::Registry;
use crate::observability::metrics;
use crate::protocol::{BridgeError, ErrorCode, HostMessage, RequestId};

/// How a pump run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Stream-end was pushed.
    End,
    /// Stream-error with this code was pushed.
    Error(ErrorCode),
    /// The push channel closed; nothing more could be delivered.
    Disconnected,
}

/// Run the pump for `id`, pushing to `out`.
pub async fn run(
    registry: &Registry,
    id: RequestId,
    max_chunk_bytes: usize,
    out: &mpsc::Sender<HostMessage>,
) -> Terminator {
    let Some(entry) = registry.get(&id) else {
        let error = BridgeError::id_not_found(&id);
        return fail(out, id, error).await;
    };
    if !entry.has_response() {
        let error = BridgeError::response_not_found(&id);
        return fail(out, id, error).await;
    }

    let token = entry.token().clone();
    let mut body = entry.body().await;
    if entry.is_retired() {
        let error = if token.is_cancelled() {
            BridgeError::aborted()
        } else {
            BridgeError::id_not_found(&id)
        };
        return fail(out, id, error).await;
    }

    let Some(reader) = body.as_mut() else {
        registry.remove(&id);
        return finish(out, id).await;
    };

    tracing::debug!(request_id = %id, "Stream started");
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(request_id = %id, "Stream cancelled");
                return fail(out, id, BridgeError::aborted()).await;
            }
            next = reader.next_chunk() => next,
        };

        match next {
            Ok(Some(chunk)) => {
                for data in split(chunk, max_chunk_bytes) {
                    let len = data.len();
                    let message = HostMessage::Chunk {
                        request_id: id.clone(),
                        data,
                    };
                    if out.send(message).await.is_err() {
                        token.cancel();
                        registry.remove(&id);
                        tracing::debug!(request_id = %id, "Stream receiver gone");
                        return Terminator::Disconnected;
                    }
                    metrics::record_chunk(len);
                }
            }
            Ok(None) => {
                registry.remove(&id);
                return finish(out, id).await;
            }
            Err(e) => {
                registry.remove(&id);
                tracing::warn!(request_id = %id, error = %e, "Stream read failed");
                return fail(out, id, BridgeError::new(ErrorCode::StreamError, e.to_string())).await;
            }
        }
    }
}

/// Split `chunk` into pieces of at most `max` bytes. Empty chunks yield nothing.
fn split(mut chunk: Bytes, max: usize) -> impl Iterator<Item = Bytes> {
    let max = max.max(1);
    std::iter::from_fn(move || {
        if chunk.is_empty() {
            None
        } else {
            Some(chunk.split_to(chunk.len().min(max)))
        }
    })
}

async fn finish(out: &mpsc::Sender<HostMessage>, request_id: RequestId) -> Terminator {
    metrics::record_stream_finished("end");
    tracing::debug!(request_id = %request_id, "Stream ended");
    match out.send(HostMessage::StreamEnd { request_id }).await {
        Ok(()) => Terminator::End,
        Err(_) => Terminator::Disconnected,
    }
}

async fn fail(
    out: &mpsc::Sender<HostMessage>,
    request_id: RequestId,
    error: BridgeError,
) -> Terminator {
    metrics::record_stream_finished("error");
    let code = error.code;
    match out.send(HostMessage::StreamError { request_id, error }).await {
        Ok(()) => Terminator::Error(code),
        Err(_) => Terminator::Disconnected,
    }
}
