//! Cross-process HTTP bridge.
//!
//! A network-restricted client delegates HTTP requests to a privileged host
//! over a message channel. Metadata comes back first; the body follows either
//! as one buffer or as ordered chunks keyed by a request id.

pub mod client;
pub mod config;
pub mod host;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod transport;

pub use client::{BridgeClient, FetchGateway, FetchInit, FetchResponse};
pub use config::BridgeConfig;
pub use host::{HostExecutor, HostServer};
pub use lifecycle::Shutdown;
pub use protocol::{BridgeError, ErrorCode, RequestId};
