//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): accepted requests by outcome
//! - `bridge_request_duration_seconds` (histogram): accept latency
//! - `bridge_inflight_requests` (gauge): live registry entries
//! - `bridge_cancellations_total` (counter): cancels by origin
//! - `bridge_stream_chunks_total` / `bridge_stream_bytes_total` (counters)
//! - `bridge_streams_total` (counter): finished streams by terminator
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing unless the host binary enables the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of one request-accept.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("bridge_requests_total", "outcome" => outcome).increment(1);
    histogram!("bridge_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record the current registry size.
pub fn record_inflight(count: usize) {
    gauge!("bridge_inflight_requests").set(count as f64);
}

/// Record a cancellation. `origin` is "client", "timeout" or "shutdown".
pub fn record_cancellation(origin: &'static str) {
    counter!("bridge_cancellations_total", "origin" => origin).increment(1);
}

/// Record one pushed chunk.
pub fn record_chunk(len: usize) {
    counter!("bridge_stream_chunks_total").increment(1);
    counter!("bridge_stream_bytes_total").increment(len as u64);
}

/// Record a stream terminator ("end" or "error").
pub fn record_stream_finished(terminator: &'static str) {
    counter!("bridge_streams_total", "terminator" => terminator).increment(1);
}
