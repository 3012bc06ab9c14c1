//! Client side of the bridge: never touches the network.
//!
//! # Data Flow
//! ```text
//! fetch(input, init) / HttpAdapter::request
//!     → request.rs (merge headers, serialize body → RequestDescriptor)
//!     → gateway.rs
//!         → channel.rs: request-accept call → ResponseMetadata
//!         → buffered:  get-body call → Bytes
//!         → streaming: subscribe + start-stream → body.rs (BodyStream)
//!     → FetchResponse { metadata, body }
//! ```
//!
//! # Design Decisions
//! - Abort is a token-backed signal checked before every stage
//! - Once the identifier is known, aborting always sends a cancel to the host

pub mod abort;
pub mod adapter;
pub mod body;
pub mod channel;
pub mod gateway;
pub mod request;

pub use abort::{AbortController, AbortSignal};
pub use adapter::{AdapterError, AdapterRequest, AdapterResponse, HttpAdapter, ResponseData, ResponseType};
pub use body::{BodyStream, FetchResponse, ResponseBody};
pub use channel::{BridgeClient, StreamEvent, StreamSubscription};
pub use gateway::FetchGateway;
pub use request::{FetchInit, FetchInput, FetchRequest, FormPart, MultipartForm, RequestBody};
