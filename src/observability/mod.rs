//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! host executor, stream pump, gateway
//!     → logging.rs (structured log events, request_id on every line)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
