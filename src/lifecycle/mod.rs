//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → HTTP client → Listener → accept loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Cancel in-flight → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, cancel, drain
//! - Drain has a deadline: the process exits even if a connection hangs

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{HostRuntime, StartupError};
