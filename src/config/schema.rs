//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for both sides of the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration for the host binary.
    pub listener: ListenerConfig,

    /// Host executor settings.
    pub host: HostConfig,

    /// Client gateway settings.
    pub client: ClientConfig,

    /// Channel transport settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:7420"). Keep this on loopback.
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7420".to_string(),
            max_connections: 64,
        }
    }
}

/// Host executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Timeout applied when a request carries none, in milliseconds (0 = none).
    pub default_timeout_ms: u64,

    /// Redirect limit applied when a request carries none.
    pub max_redirects: u32,

    /// User-Agent sent when the request has none.
    pub user_agent: String,

    /// Largest chunk pushed in one stream notification; bigger reads are split.
    pub max_chunk_bytes: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 0,
            max_redirects: 10,
            user_agent: concat!("fetch-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
            max_chunk_bytes: 64 * 1024,
        }
    }
}

/// How the client gateway retrieves response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    /// One get-body call returning the whole body.
    #[default]
    Buffered,
    /// Start-stream followed by chunk pushes.
    Streaming,
}

/// Client gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default body retrieval mode.
    pub body_mode: BodyMode,

    /// Host address the CLI connects to.
    pub host_address: String,

    /// Unread bytes a streamed body may queue before it is failed.
    pub stream_buffer_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            body_mode: BodyMode::Buffered,
            host_address: "127.0.0.1:7420".to_string(),
            stream_buffer_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of each message queue.
    pub channel_capacity: usize,

    /// Largest frame accepted or produced by framed transports.
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_frame_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9420".to_string(),
        }
    }
}
