//! Channel transports.
//!
//! # Data Flow
//! ```text
//! BridgeClient ─▶ Endpoint.outbound ─▶ [memory pair | framed codec] ─▶ HostServer
//! BridgeClient ◀─ Endpoint.inbound  ◀─ [memory pair | framed codec] ◀─ HostServer
//! ```
//!
//! # Design Decisions
//! - Both sides only ever see a pair of ordered mpsc queues; the concrete
//!   channel (in-process, socket, child stdio) is hidden behind them
//! - Framed transports bridge a byte stream to the queues with one reader
//!   task and one writer task; dropping the endpoint closes the stream

pub mod framed;
pub mod memory;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, HostMessage};

/// One side of a bidirectional message channel.
#[derive(Debug)]
pub struct Endpoint<Out, In> {
    pub outbound: mpsc::Sender<Out>,
    pub inbound: mpsc::Receiver<In>,
    /// Largest frame the transport will carry, if it has a limit.
    pub max_frame_bytes: Option<usize>,
}

/// Client side: sends calls, receives replies and pushes.
pub type ClientEndpoint = Endpoint<ClientMessage, HostMessage>;

/// Host side: receives calls, sends replies and pushes.
pub type HostEndpoint = Endpoint<HostMessage, ClientMessage>;

/// Errors produced by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame header: {0}")]
    Header(#[from] serde_json::Error),

    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("unsupported protocol version {found} (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },

    #[error("unexpected payload for {0} message")]
    UnexpectedPayload(String),

    #[error("invalid payload flag {0}")]
    InvalidPayloadFlag(u8),
}
