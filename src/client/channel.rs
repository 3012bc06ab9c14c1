//! Client half of the bridge channel.
//!
//! # Responsibilities
//! - Correlate calls with their replies (call ids)
//! - Fire-and-forget sends (cancel, start-stream)
//! - Route chunk / stream-end / stream-error pushes to per-id subscriptions
//!
//! # Design Decisions
//! - One dispatcher task owns the inbound queue; it only holds a weak
//!   reference, so dropping every handle closes the outbound side
//! - When the channel closes every pending call and subscription is failed
//!   with a channel-closed error instead of hanging
//! - Routing never waits on a slow consumer. Each subscription instead has
//!   a byte budget; a stream that outgrows it is failed with STREAM_ERROR
//!   and cancelled on the host
//! - Calls that cannot fit in one transport frame are rejected locally

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::protocol::{
    BridgeError, BridgeResult, Call, ClientMessage, ErrorCode, HostMessage, Reply, RequestId,
};
use crate::transport::{framed, ClientEndpoint};

/// One push delivered to a stream subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(Bytes),
    End,
    Error(BridgeError),
}

/// Receiving side of a stream subscription.
#[derive(Debug)]
pub struct StreamSubscription {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    buffered: Arc<AtomicUsize>,
}

impl StreamSubscription {
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let event = ready!(self.events.poll_recv(cx));
        if let Some(StreamEvent::Chunk(data)) = &event {
            self.buffered.fetch_sub(data.len(), Ordering::AcqRel);
        }
        Poll::Ready(event)
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Chunk bytes received but not yet consumed.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

struct StreamSender {
    events: mpsc::UnboundedSender<StreamEvent>,
    buffered: Arc<AtomicUsize>,
}

enum Delivery {
    Delivered,
    Gone,
    OverBudget(usize),
}

impl StreamSender {
    fn push(&self, data: Bytes, budget: usize) -> Delivery {
        let len = data.len();
        let buffered = self.buffered.fetch_add(len, Ordering::AcqRel) + len;
        if buffered > budget {
            return Delivery::OverBudget(buffered);
        }
        match self.events.send(StreamEvent::Chunk(data)) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Gone,
        }
    }

    fn finish(self, event: StreamEvent) {
        let _ = self.events.send(event);
    }
}

struct Inner {
    outbound: mpsc::Sender<ClientMessage>,
    pending: DashMap<u64, oneshot::Sender<BridgeResult<Reply>>>,
    streams: DashMap<RequestId, StreamSender>,
    next_call_id: AtomicU64,
    closed: CancellationToken,
    max_frame_bytes: Option<usize>,
    stream_buffer_bytes: usize,
}

impl Inner {
    fn next_call_id(&self) -> u64 {
        self.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send_cancel(&self, request_id: &RequestId) {
        let message = ClientMessage::Call {
            call_id: self.next_call_id(),
            call: Call::Cancel {
                request_id: request_id.clone(),
            },
        };
        match self.outbound.try_send(message) {
            Ok(()) => tracing::debug!(request_id = %request_id, "Cancel sent"),
            Err(TrySendError::Full(message)) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let outbound = self.outbound.clone();
                    handle.spawn(async move {
                        let _ = outbound.send(message).await;
                    });
                }
                Err(_) => {
                    tracing::warn!(request_id = %request_id, "Cancel dropped: queue full outside runtime")
                }
            },
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(request_id = %request_id, "Cancel dropped: channel closed")
            }
        }
    }

    fn check_frame(&self, message: &ClientMessage) -> BridgeResult<()> {
        let Some(max) = self.max_frame_bytes else {
            return Ok(());
        };
        let size = framed::frame_len(message)
            .map_err(|e| BridgeError::new(ErrorCode::FetchError, e.to_string()))?;
        if size > max {
            return Err(BridgeError::new(
                ErrorCode::FetchError,
                format!("request of {} bytes exceeds the {} byte frame limit", size, max),
            ));
        }
        Ok(())
    }

    fn route(&self, message: HostMessage) {
        match message {
            HostMessage::Reply { call_id, result } => match self.pending.remove(&call_id) {
                Some((_, tx)) => {
                    let _ = tx.send(result);
                }
                None => tracing::trace!(call_id, "Reply without pending call"),
            },
            HostMessage::Chunk { request_id, data } => {
                let delivery = self
                    .streams
                    .get(&request_id)
                    .map(|tx| tx.push(data, self.stream_buffer_bytes));
                match delivery {
                    Some(Delivery::Delivered) => {}
                    Some(Delivery::Gone) => {
                        self.streams.remove(&request_id);
                    }
                    Some(Delivery::OverBudget(buffered)) => {
                        tracing::warn!(
                            request_id = %request_id,
                            buffered,
                            limit = self.stream_buffer_bytes,
                            "Stream consumer fell behind, cancelling"
                        );
                        if let Some((_, tx)) = self.streams.remove(&request_id) {
                            tx.finish(StreamEvent::Error(BridgeError::new(
                                ErrorCode::StreamError,
                                format!(
                                    "{} unread bytes exceed the {} byte stream buffer",
                                    buffered, self.stream_buffer_bytes
                                ),
                            )));
                        }
                        self.send_cancel(&request_id);
                    }
                    None => tracing::trace!(request_id = %request_id, "Chunk without subscriber"),
                }
            }
            HostMessage::StreamEnd { request_id } => {
                if let Some((_, tx)) = self.streams.remove(&request_id) {
                    tx.finish(StreamEvent::End);
                }
            }
            HostMessage::StreamError { request_id, error } => {
                if let Some((_, tx)) = self.streams.remove(&request_id) {
                    tx.finish(StreamEvent::Error(error));
                }
            }
        }
    }

    fn close(&self) {
        self.closed.cancel();
        let calls: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for call_id in calls {
            if let Some((_, tx)) = self.pending.remove(&call_id) {
                let _ = tx.send(Err(BridgeError::channel_closed()));
            }
        }
        let streams: Vec<RequestId> = self.streams.iter().map(|e| e.key().clone()).collect();
        for id in streams {
            if let Some((_, tx)) = self.streams.remove(&id) {
                tx.finish(StreamEvent::Error(BridgeError::channel_closed()));
            }
        }
    }
}

/// Cheaply cloneable handle to a connected bridge.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<Inner>,
}

impl BridgeClient {
    /// Take ownership of an endpoint and start the dispatcher task.
    pub fn connect(endpoint: ClientEndpoint) -> Self {
        Self::connect_with_config(endpoint, &ClientConfig::default())
    }

    /// Like [`BridgeClient::connect`], with limits taken from `config`.
    pub fn connect_with_config(endpoint: ClientEndpoint, config: &ClientConfig) -> Self {
        let ClientEndpoint {
            outbound,
            inbound,
            max_frame_bytes,
        } = endpoint;
        let inner = Arc::new(Inner {
            outbound,
            pending: DashMap::new(),
            streams: DashMap::new(),
            next_call_id: AtomicU64::new(1),
            closed: CancellationToken::new(),
            max_frame_bytes,
            stream_buffer_bytes: config.stream_buffer_bytes.max(1),
        });
        tokio::spawn(dispatch(Arc::downgrade(&inner), inbound));
        Self { inner }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled() || self.inner.outbound.is_closed()
    }

    /// Resolves once the channel has closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Send a call and wait for its reply.
    pub async fn call(&self, call: Call) -> BridgeResult<Reply> {
        let call_id = self.inner.next_call_id();
        let name = call.name();
        let message = ClientMessage::Call { call_id, call };
        self.inner.check_frame(&message)?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(call_id, tx);
        let _pending = PendingGuard {
            inner: &self.inner,
            call_id,
        };

        if self.inner.closed.is_cancelled() {
            return Err(BridgeError::channel_closed());
        }

        if self.inner.outbound.send(message).await.is_err() {
            return Err(BridgeError::channel_closed());
        }
        tracing::trace!(call_id, call = name, "Call sent");

        rx.await.unwrap_or_else(|_| Err(BridgeError::channel_closed()))
    }

    /// Best-effort cancel. Never blocks and never fails; problems are logged.
    pub fn cancel(&self, request_id: &RequestId) {
        self.inner.send_cancel(request_id);
    }

    /// Subscribe to pushes for `request_id`, then ask the host to start streaming.
    pub async fn start_stream(&self, request_id: &RequestId) -> BridgeResult<StreamSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        self.inner.streams.insert(
            request_id.clone(),
            StreamSender {
                events: tx,
                buffered: buffered.clone(),
            },
        );

        let message = ClientMessage::StartStream {
            request_id: request_id.clone(),
        };
        if self.inner.closed.is_cancelled() || self.inner.outbound.send(message).await.is_err() {
            self.inner.streams.remove(request_id);
            return Err(BridgeError::channel_closed());
        }
        Ok(StreamSubscription {
            events: rx,
            buffered,
        })
    }

    /// Drop the subscription for `request_id`, if any.
    pub fn unsubscribe(&self, request_id: &RequestId) {
        self.inner.streams.remove(request_id);
    }

    /// Number of calls awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of live stream subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.inner.streams.len()
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("closed", &self.is_closed())
            .field("pending_calls", &self.pending_calls())
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}

struct PendingGuard<'a> {
    inner: &'a Inner,
    call_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.remove(&self.call_id);
    }
}

async fn dispatch(inner: Weak<Inner>, mut inbound: mpsc::Receiver<HostMessage>) {
    while let Some(message) = inbound.recv().await {
        match inner.upgrade() {
            Some(inner) => inner.route(message),
            None => return,
        }
    }
    tracing::debug!("Bridge channel closed");
    if let Some(inner) = inner.upgrade() {
        inner.close();
    }
}
