//! Response bodies as seen by the caller.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::client::abort::AbortSignal;
use crate::client::channel::{BridgeClient, StreamEvent, StreamSubscription};
use crate::protocol::{BridgeError, BridgeResult, ErrorCode, HeaderList, RequestId, ResponseMetadata};

/// Ordered body chunks for one request.
///
/// Yields `Ok(chunk)` per chunk, then ends (`None`) on stream-end or yields a
/// single `Err` on stream-error. Once the abort signal fires the next poll
/// yields `ABORTED`, even if chunks are still queued. Dropping it early
/// cancels the request.
///
/// Chunks the caller has not read yet are held in memory up to
/// `ClientConfig::stream_buffer_bytes`; past that the stream fails with
/// `STREAM_ERROR` and the request is cancelled.
pub struct BodyStream {
    request_id: RequestId,
    events: StreamSubscription,
    client: BridgeClient,
    signal: Option<AbortSignal>,
    watcher: Option<JoinHandle<()>>,
    finished: bool,
}

impl BodyStream {
    pub(crate) fn new(
        request_id: RequestId,
        events: StreamSubscription,
        client: BridgeClient,
        signal: Option<AbortSignal>,
    ) -> Self {
        let watcher = signal.clone().map(|signal| {
            let client = client.clone();
            let request_id = request_id.clone();
            tokio::spawn(async move {
                signal.wait().await;
                tracing::debug!(request_id = %request_id, "Stream aborted by caller");
                client.cancel(&request_id);
            })
        });
        Self {
            request_id,
            events,
            client,
            signal,
            watcher,
            finished: false,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Cancel the request and stop yielding chunks.
    pub fn cancel(&mut self) {
        if !self.finished {
            self.finished = true;
            self.client.unsubscribe(&self.request_id);
            self.client.cancel(&self.request_id);
        }
    }

    /// Collect the remaining chunks.
    pub async fn bytes(mut self) -> BridgeResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    fn aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

impl Stream for BodyStream {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.aborted() {
            this.cancel();
            return Poll::Ready(Some(Err(BridgeError::aborted())));
        }

        let event = ready!(this.events.poll_recv(cx));
        match event {
            Some(StreamEvent::Chunk(data)) => Poll::Ready(Some(Ok(data))),
            Some(StreamEvent::End) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Some(StreamEvent::Error(error)) => {
                this.finished = true;
                let error = if this.aborted() { BridgeError::aborted() } else { error };
                Poll::Ready(Some(Err(error)))
            }
            None => {
                this.finished = true;
                let error = if this.aborted() {
                    BridgeError::aborted()
                } else {
                    BridgeError::channel_closed()
                };
                Poll::Ready(Some(Err(error)))
            }
        }
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        if !self.finished {
            tracing::debug!(request_id = %self.request_id, "Stream dropped before terminator");
            self.cancel();
        }
    }
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream")
            .field("request_id", &self.request_id)
            .field("finished", &self.finished)
            .finish()
    }
}

/// A response body: fully buffered, or streamed chunk by chunk.
#[derive(Debug)]
pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(BodyStream),
}

impl ResponseBody {
    /// The whole body, draining the stream if necessary.
    pub async fn bytes(self) -> BridgeResult<Bytes> {
        match self {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(stream) => stream.bytes().await,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseBody::Streaming(_))
    }
}

/// Response returned by [`FetchGateway::fetch`](crate::client::FetchGateway::fetch).
#[derive(Debug)]
pub struct FetchResponse {
    metadata: ResponseMetadata,
    body: ResponseBody,
}

impl FetchResponse {
    pub(crate) fn new(metadata: ResponseMetadata, body: ResponseBody) -> Self {
        Self { metadata, body }
    }

    pub fn status(&self) -> u16 {
        self.metadata.status
    }

    pub fn status_text(&self) -> &str {
        &self.metadata.status_text
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..=299).contains(&self.metadata.status)
    }

    pub fn headers(&self) -> &HeaderList {
        &self.metadata.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.metadata.headers.get(name)
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &str {
        &self.metadata.url
    }

    pub fn request_id(&self) -> &RequestId {
        &self.metadata.request_id
    }

    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    pub async fn bytes(self) -> BridgeResult<Bytes> {
        self.body.bytes().await
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub async fn text(self) -> BridgeResult<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> BridgeResult<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            BridgeError::new(ErrorCode::FetchError, format!("invalid JSON body: {}", e))
        })
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    pub fn into_parts(self) -> (ResponseMetadata, ResponseBody) {
        (self.metadata, self.body)
    }
}
