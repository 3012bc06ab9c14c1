//! Host side of the bridge: performs the network I/O.
//!
//! # Data Flow
//! ```text
//! HostEndpoint.inbound
//!     → server.rs (one task per call)
//!     → executor.rs
//!         request-accept → fetcher.rs (HttpFetcher) → registry.rs (attach response)
//!         cancel         → registry.rs (remove + cancel token)
//!         get-body       → registry.rs → BodyReader::read_all → remove
//!     → start-stream → pump.rs → chunk* → stream-end | stream-error
//!     → HostEndpoint.outbound
//! ```
//!
//! # Design Decisions
//! - One executor and one registry per connection; the HTTP client is shared
//! - Cancellation is a token per entry, observed by fetch and every body read
//! - Entries are removed exactly once, whichever flow gets there first

pub mod executor;
pub mod fetcher;
pub mod pump;
pub mod registry;
pub mod server;

pub use executor::{ExecutorSettings, HostExecutor};
pub use fetcher::{
    BodyReader, ChunkedBody, FetchCall, FetchFailure, FetchedResponse, HttpFetcher, ReqwestFetcher,
};
pub use pump::Terminator;
pub use registry::{InFlightEntry, Registry};
pub use server::HostServer;
