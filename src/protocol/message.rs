//! Channel message surface.
//!
//! | Message        | Direction                   | Payload in        | Payload out        |
//! |----------------|-----------------------------|-------------------|--------------------|
//! | request-accept | client→host (call)          | RequestDescriptor | ResponseMetadata   |
//! | cancel         | client→host (call)          | id                | none               |
//! | get-body       | client→host (call)          | id                | bytes              |
//! | start-stream   | client→host (send)          | id                | —                  |
//! | chunk          | host→client (push)          | —                 | id + bytes         |
//! | stream-end     | host→client (push)          | —                 | id                 |
//! | stream-error   | host→client (push)          | —                 | id + error         |

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::protocol::error::{BridgeError, ErrorCode};
use crate::protocol::types::{RequestDescriptor, RequestId, ResponseMetadata};

/// A call expecting exactly one [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Call {
    RequestAccept { descriptor: RequestDescriptor },
    Cancel { request_id: RequestId },
    GetBody { request_id: RequestId },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::RequestAccept { .. } => "request-accept",
            Call::Cancel { .. } => "cancel",
            Call::GetBody { .. } => "get-body",
        }
    }
}

/// Successful answer to a [`Call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Reply {
    Accepted { metadata: ResponseMetadata },
    Cancelled,
    Body {
        #[serde(skip)]
        data: Bytes,
    },
}

/// Messages sent from the client side to the host side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Call { call_id: u64, call: Call },
    StartStream { request_id: RequestId },
}

/// Messages sent from the host side to the client side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostMessage {
    Reply {
        call_id: u64,
        result: Result<Reply, BridgeError>,
    },
    Chunk {
        request_id: RequestId,
        #[serde(skip)]
        data: Bytes,
    },
    StreamEnd {
        request_id: RequestId,
    },
    StreamError {
        request_id: RequestId,
        error: BridgeError,
    },
}

/// A message that can be split into a structured header and a binary payload.
///
/// Framed transports serialize the header with serde and ship the payload
/// as raw bytes next to it; in-process transports move the value as-is.
pub trait WireMessage: Serialize + DeserializeOwned + Send + 'static {
    /// Move the binary payload out of the message, if it has one.
    fn take_payload(&mut self) -> Option<Bytes>;

    /// Put a received payload back. Returns false if the message has no slot for it.
    fn attach_payload(&mut self, payload: Bytes) -> bool;

    /// Length of the payload `take_payload` would return.
    fn payload_len(&self) -> Option<usize>;

    /// Stand-in for a message too large to frame, scoped to the call or
    /// stream it belongs to. `None` means the message is dropped.
    fn oversized(self, size: usize, max: usize) -> Option<Self>;
}

impl WireMessage for ClientMessage {
    fn take_payload(&mut self) -> Option<Bytes> {
        match self {
            ClientMessage::Call {
                call: Call::RequestAccept { descriptor },
                ..
            } => descriptor.body.take(),
            _ => None,
        }
    }

    fn attach_payload(&mut self, payload: Bytes) -> bool {
        match self {
            ClientMessage::Call {
                call: Call::RequestAccept { descriptor },
                ..
            } => {
                descriptor.body = Some(payload);
                true
            }
            _ => false,
        }
    }

    fn payload_len(&self) -> Option<usize> {
        match self {
            ClientMessage::Call {
                call: Call::RequestAccept { descriptor },
                ..
            } => descriptor.body.as_ref().map(Bytes::len),
            _ => None,
        }
    }

    fn oversized(self, _size: usize, _max: usize) -> Option<Self> {
        None
    }
}

impl WireMessage for HostMessage {
    fn take_payload(&mut self) -> Option<Bytes> {
        match self {
            HostMessage::Reply {
                result: Ok(Reply::Body { data }),
                ..
            } => Some(std::mem::take(data)),
            HostMessage::Chunk { data, .. } => Some(std::mem::take(data)),
            _ => None,
        }
    }

    fn attach_payload(&mut self, payload: Bytes) -> bool {
        match self {
            HostMessage::Reply {
                result: Ok(Reply::Body { data }),
                ..
            }
            | HostMessage::Chunk { data, .. } => {
                *data = payload;
                true
            }
            _ => false,
        }
    }

    fn payload_len(&self) -> Option<usize> {
        match self {
            HostMessage::Reply {
                result: Ok(Reply::Body { data }),
                ..
            }
            | HostMessage::Chunk { data, .. } => Some(data.len()),
            _ => None,
        }
    }

    fn oversized(self, size: usize, max: usize) -> Option<Self> {
        let message = format!("message of {} bytes exceeds the {} byte frame limit", size, max);
        match self {
            HostMessage::Reply {
                call_id,
                result: Ok(Reply::Body { .. }),
            } => Some(HostMessage::Reply {
                call_id,
                result: Err(BridgeError::new(ErrorCode::BodyError, message)),
            }),
            HostMessage::Chunk { request_id, .. } => Some(HostMessage::StreamError {
                request_id,
                error: BridgeError::new(ErrorCode::StreamError, message),
            }),
            _ => None,
        }
    }
}
