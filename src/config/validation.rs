//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Check that pushed chunks always fit in a frame
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::BridgeConfig;

/// Room reserved in a frame for the header of a chunk notification.
const FRAME_HEADER_ALLOWANCE: usize = 1024;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    if config.client.host_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "client.host_address",
            format!("'{}' is not a socket address", config.client.host_address),
        ));
    }

    if config.client.stream_buffer_bytes == 0 {
        errors.push(ValidationError::new("client.stream_buffer_bytes", "must be > 0"));
    }

    if config.host.max_chunk_bytes == 0 {
        errors.push(ValidationError::new("host.max_chunk_bytes", "must be > 0"));
    }
    if config.host.user_agent.trim().is_empty() {
        errors.push(ValidationError::new("host.user_agent", "must not be empty"));
    }

    if config.transport.channel_capacity == 0 {
        errors.push(ValidationError::new("transport.channel_capacity", "must be > 0"));
    }
    if config.host.max_chunk_bytes.saturating_add(FRAME_HEADER_ALLOWANCE) > config.transport.max_frame_bytes {
        errors.push(ValidationError::new(
            "transport.max_frame_bytes",
            format!(
                "must leave {} bytes of headroom above host.max_chunk_bytes ({})",
                FRAME_HEADER_ALLOWANCE, config.host.max_chunk_bytes
            ),
        ));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = BridgeConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.transport.channel_capacity = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "transport.channel_capacity", "observability.log_level"]
        );
    }

    #[test]
    fn chunks_must_fit_in_frames() {
        let mut config = BridgeConfig::default();
        config.transport.max_frame_bytes = 4096;
        config.host.max_chunk_bytes = 4096;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "transport.max_frame_bytes");
    }

    #[test]
    fn huge_chunk_size_is_rejected_without_overflow() {
        let mut config = BridgeConfig::default();
        config.host.max_chunk_bytes = usize::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "transport.max_frame_bytes");
    }
}
