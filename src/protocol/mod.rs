//! Bridge protocol: the single, versioned message contract.
//!
//! # Data Flow
//! ```text
//! client                                   host
//!   Call::RequestAccept(descriptor) ─────▶  accept → Reply::Accepted(metadata)
//!   Call::GetBody(id)              ──────▶  get_body → Reply::Body(bytes)
//!   Call::Cancel(id)               ──────▶  cancel → Reply::Cancelled
//!   ClientMessage::StartStream(id) ──────▶  stream pump
//!                                  ◀──────  HostMessage::Chunk(id, bytes)*
//!                                  ◀──────  HostMessage::StreamEnd(id) | StreamError(id, err)
//! ```
//!
//! # Design Decisions
//! - One dialect only: accept, body and stream are separate messages keyed
//!   by the host-allocated [`RequestId`]
//! - Binary data never travels inside the structured header; transports
//!   carry it as a separate payload (see [`message::WireMessage`])
//! - Every failure crossing the boundary is a [`BridgeError`] with a stable code

pub mod error;
pub mod message;
pub mod types;

pub use error::{BridgeError, BridgeResult, ErrorCode};
pub use message::{Call, ClientMessage, HostMessage, Reply, WireMessage};
pub use types::{
    BasicAuth, HeaderList, ProxyEndpoint, ProxySettings, ProxyTarget, RequestDescriptor,
    RequestId, ResponseMetadata,
};

/// Version of the message contract. Framed transports reject any other value.
pub const PROTOCOL_VERSION: u16 = 1;

/// Prefix shared by request identifiers and channel names.
pub const BRIDGE_NAMESPACE: &str = "fetch-bridge";
