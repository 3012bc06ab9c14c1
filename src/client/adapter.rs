//! Request/response adapter for HTTP-library style callers.
//!
//! Maps a base URL + path + query params + status predicate request onto
//! [`FetchGateway::fetch`] and decodes the body by response type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::client::abort::AbortSignal;
use crate::client::gateway::FetchGateway;
use crate::client::request::{FetchInit, RequestBody};
use crate::config::BodyMode;
use crate::protocol::{BridgeError, HeaderList, ProxySettings, RequestId};

/// How the response body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Bytes,
    Text,
    Json,
}

impl ResponseType {
    /// Pick a type from a `content-type` header. Missing header means text.
    pub fn infer(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return ResponseType::Text;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            ResponseType::Json
        } else if essence.starts_with("text/")
            || essence.ends_with("+xml")
            || matches!(
                essence.as_str(),
                "application/xml" | "application/javascript" | "application/x-www-form-urlencoded"
            )
        {
            ResponseType::Text
        } else {
            ResponseType::Bytes
        }
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

impl ResponseData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }
}

type StatusPredicate = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// One adapter request.
#[derive(Clone, Default)]
pub struct AdapterRequest {
    pub base_url: Option<String>,
    pub url: String,
    pub method: String,
    pub params: Vec<(String, String)>,
    pub data: Option<RequestBody>,
    pub headers: HeaderList,
    pub timeout: Option<Duration>,
    pub max_redirects: Option<u32>,
    pub proxy: Option<ProxySettings>,
    pub signal: Option<AbortSignal>,
    pub response_type: Option<ResponseType>,
    validate_status: Option<StatusPredicate>,
}

impl AdapterRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn data(mut self, data: impl Into<RequestBody>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Accept statuses for which `predicate` returns true. Default: 200..=299.
    pub fn validate_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.validate_status = Some(Arc::new(predicate));
        self
    }

    fn status_is_valid(&self, status: u16) -> bool {
        match &self.validate_status {
            Some(predicate) => predicate(status),
            None => (200..=299).contains(&status),
        }
    }

    /// Base joined with the path, plus serialized params.
    pub fn full_url(&self) -> Result<String, AdapterError> {
        build_full_url(self.base_url.as_deref(), &self.url, &self.params)
    }
}

impl fmt::Debug for AdapterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRequest")
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

/// Decoded adapter response.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    pub request_id: RequestId,
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub headers: HeaderList,
    pub response_type: ResponseType,
    pub data: ResponseData,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The status failed the request's predicate. The response is kept.
    #[error("request failed with status code {}", .0.status)]
    Status(Box<AdapterResponse>),

    #[error(transparent)]
    Fetch(#[from] BridgeError),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to decode {response_type:?} body: {reason}")]
    Decode {
        response_type: ResponseType,
        reason: String,
    },
}

/// Runs [`AdapterRequest`]s through a [`FetchGateway`].
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    gateway: FetchGateway,
}

impl HttpAdapter {
    pub fn new(gateway: FetchGateway) -> Self {
        Self { gateway }
    }

    pub async fn request(&self, request: AdapterRequest) -> Result<AdapterResponse, AdapterError> {
        let url = request.full_url()?;

        let mut init = FetchInit::new()
            .method(if request.method.is_empty() { "GET" } else { request.method.as_str() })
            .body_mode(BodyMode::Buffered);
        init.headers = request.headers.clone();
        if let Some(data) = request.data.clone() {
            init = init.body(data);
        }
        init.timeout = request.timeout;
        init.max_redirects = request.max_redirects;
        init.proxy = request.proxy.clone();
        init.signal = request.signal.clone();

        let response = self.gateway.fetch(url, init).await?;
        let (metadata, body) = response.into_parts();
        let bytes = body.bytes().await?;

        let response_type = request
            .response_type
            .unwrap_or_else(|| ResponseType::infer(metadata.headers.get("content-type")));
        let data = decode(response_type, bytes)?;

        let response = AdapterResponse {
            request_id: metadata.request_id,
            status: metadata.status,
            status_text: metadata.status_text,
            url: metadata.url,
            headers: metadata.headers,
            response_type,
            data,
        };

        if request.status_is_valid(response.status) {
            Ok(response)
        } else {
            tracing::debug!(status = response.status, url = %response.url, "Status rejected by predicate");
            Err(AdapterError::Status(Box::new(response)))
        }
    }
}

fn decode(response_type: ResponseType, bytes: Bytes) -> Result<ResponseData, AdapterError> {
    match response_type {
        ResponseType::Bytes => Ok(ResponseData::Bytes(bytes)),
        ResponseType::Text => Ok(ResponseData::Text(String::from_utf8_lossy(&bytes).into_owned())),
        ResponseType::Json if bytes.is_empty() => Ok(ResponseData::Json(serde_json::Value::Null)),
        ResponseType::Json => serde_json::from_slice(&bytes)
            .map(ResponseData::Json)
            .map_err(|e| AdapterError::Decode {
                response_type,
                reason: e.to_string(),
            }),
    }
}

fn is_absolute(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return url.starts_with("//");
    };
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Join `base` and `url` (absolute urls bypass the base) and append `params`.
pub fn build_full_url(
    base: Option<&str>,
    url: &str,
    params: &[(String, String)],
) -> Result<String, AdapterError> {
    let mut full = match base {
        Some(base) if !is_absolute(url) => {
            if url.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
        }
        _ => url.to_string(),
    };

    if !params.is_empty() {
        if let Some(hash) = full.find('#') {
            full.truncate(hash);
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        full.push(if full.contains('?') { '&' } else { '?' });
        full.push_str(&query);
    }

    Url::parse(&full).map_err(|e| AdapterError::InvalidUrl {
        url: full.clone(),
        reason: e.to_string(),
    })?;
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn relative_paths_join_the_base() {
        let url = build_full_url(Some("https://api.test/v1/"), "/items", &[]).unwrap();
        assert_eq!(url, "https://api.test/v1/items");
    }

    #[test]
    fn absolute_urls_bypass_the_base() {
        let url = build_full_url(Some("https://api.test/v1"), "http://other.test/x", &[]).unwrap();
        assert_eq!(url, "http://other.test/x");
    }

    #[test]
    fn params_are_appended_and_hash_dropped() {
        let url = build_full_url(
            None,
            "https://api.test/search?lang=en#top",
            &params(&[("q", "a b"), ("page", "2")]),
        )
        .unwrap();
        assert_eq!(url, "https://api.test/search?lang=en&q=a+b&page=2");
    }

    #[test]
    fn relative_url_without_base_is_invalid() {
        assert!(matches!(
            build_full_url(None, "/items", &[]),
            Err(AdapterError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn response_type_inference() {
        assert_eq!(ResponseType::infer(Some("application/json; charset=utf-8")), ResponseType::Json);
        assert_eq!(ResponseType::infer(Some("application/problem+json")), ResponseType::Json);
        assert_eq!(ResponseType::infer(Some("text/html")), ResponseType::Text);
        assert_eq!(ResponseType::infer(Some("image/png")), ResponseType::Bytes);
        assert_eq!(ResponseType::infer(None), ResponseType::Text);
    }

    #[test]
    fn default_status_predicate() {
        let request = AdapterRequest::new("GET", "https://api.test/");
        assert!(request.status_is_valid(204));
        assert!(!request.status_is_valid(404));

        let request = request.validate_status(|status| status < 500);
        assert!(request.status_is_valid(404));
    }

    #[test]
    fn json_decoding() {
        assert_eq!(
            decode(ResponseType::Json, Bytes::new()).unwrap(),
            ResponseData::Json(serde_json::Value::Null)
        );
        assert!(matches!(
            decode(ResponseType::Json, Bytes::from_static(b"{")),
            Err(AdapterError::Decode { .. })
        ));
    }
}
