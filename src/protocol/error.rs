//! Error taxonomy signaled across the bridge.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::types::RequestId;

/// Stable, machine-checkable error codes.
///
/// The serialized names are part of the protocol and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The client side has no usable bridge.
    ApiNotFound,
    /// Caller-initiated cancellation.
    Aborted,
    /// Configured timeout elapsed before the response arrived.
    Timeout,
    /// No in-flight entry for the referenced identifier.
    IdNotFound,
    /// Entry exists but no response has been attached yet.
    ResponseNotFound,
    /// The underlying HTTP client failed to produce a response.
    FetchRequestError,
    /// Generic fallback for unexpected failures.
    FetchError,
    /// Reading the full body failed.
    BodyError,
    /// Reading or relaying a streamed body failed.
    StreamError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ApiNotFound => "API_NOT_FOUND",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::IdNotFound => "ID_NOT_FOUND",
            ErrorCode::ResponseNotFound => "RESPONSE_NOT_FOUND",
            ErrorCode::FetchRequestError => "FETCH_REQUEST_ERROR",
            ErrorCode::FetchError => "FETCH_ERROR",
            ErrorCode::BodyError => "BODY_ERROR",
            ErrorCode::StreamError => "STREAM_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error that crossed (or would cross) the bridge: a code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BridgeError {
    pub code: ErrorCode,
    pub message: String,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn api_not_found() -> Self {
        Self::new(ErrorCode::ApiNotFound, "fetch bridge api not found")
    }

    pub fn aborted() -> Self {
        Self::new(ErrorCode::Aborted, "Request aborted")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "Request timeout")
    }

    pub fn id_not_found(id: &RequestId) -> Self {
        Self::new(ErrorCode::IdNotFound, format!("RequestId not found: {}", id))
    }

    pub fn response_not_found(id: &RequestId) -> Self {
        Self::new(
            ErrorCode::ResponseNotFound,
            format!("Response not found: {}", id),
        )
    }

    pub fn channel_closed() -> Self {
        Self::new(ErrorCode::FetchError, "bridge channel closed")
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_to_stable_names() {
        let all = [
            ErrorCode::ApiNotFound,
            ErrorCode::Aborted,
            ErrorCode::Timeout,
            ErrorCode::IdNotFound,
            ErrorCode::ResponseNotFound,
            ErrorCode::FetchRequestError,
            ErrorCode::FetchError,
            ErrorCode::BodyError,
            ErrorCode::StreamError,
        ];
        for code in all {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = BridgeError::timeout();
        assert_eq!(err.to_string(), "TIMEOUT: Request timeout");
        assert!(err.is(ErrorCode::Timeout));
    }

    #[test]
    fn error_wire_shape() {
        let err = BridgeError::id_not_found(&RequestId::from("abc"));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], "ID_NOT_FOUND");
        assert_eq!(value["message"], "RequestId not found: abc");
    }
}
