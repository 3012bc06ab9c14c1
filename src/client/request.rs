//! Request construction on the client side.
//!
//! # Responsibilities
//! - Fetch-style inputs ([`FetchInput`], [`FetchRequest`], [`FetchInit`])
//! - Header merging (init wins on conflict)
//! - Body serialization: bytes, text, url-encoded form, multipart form
//! - Producing the [`RequestDescriptor`] that crosses the bridge

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use url::Url;
use uuid::Uuid;

use crate::client::abort::AbortSignal;
use crate::config::BodyMode;
use crate::protocol::{BridgeError, ErrorCode, HeaderList, ProxySettings, RequestDescriptor};

const CONTENT_TYPE: &str = "content-type";

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A `multipart/form-data` body with its own boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<FormPart>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("----fetch-bridge-{}", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: Bytes::from(value.into()),
        });
        self
    }

    /// Add a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Serialize the form. An empty form encodes to the closing boundary only.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for part in &self.parts {
            buf.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!(
                "Content-Disposition: form-data; name=\"{}\"",
                escape_quoted(&part.name)
            );
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
            }
            buf.put_slice(disposition.as_bytes());
            buf.put_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                buf.put_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            }
            buf.put_slice(b"\r\n");
            buf.put_slice(&part.data);
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        buf.freeze()
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Request body before serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    /// Serialized as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Build a url-encoded form body from pairs.
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Content type applied when the caller did not set one.
    fn default_content_type(&self) -> Option<String> {
        match self {
            RequestBody::Text(_) => Some("text/plain;charset=UTF-8".to_string()),
            RequestBody::Form(_) => {
                Some("application/x-www-form-urlencoded;charset=UTF-8".to_string())
            }
            RequestBody::Multipart(form) => Some(form.content_type()),
            RequestBody::Empty | RequestBody::Bytes(_) => None,
        }
    }

    /// Serialized bytes, `None` when empty.
    pub fn into_bytes(self) -> Option<Bytes> {
        let bytes = match self {
            RequestBody::Empty => return None,
            RequestBody::Bytes(bytes) => bytes,
            RequestBody::Text(text) => Bytes::from(text),
            RequestBody::Form(pairs) => Bytes::from(
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish(),
            ),
            RequestBody::Multipart(form) => form.encode(),
        };
        (!bytes.is_empty()).then_some(bytes)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        RequestBody::Bytes(value)
    }
}

impl From<MultipartForm> for RequestBody {
    fn from(value: MultipartForm) -> Self {
        RequestBody::Multipart(value)
    }
}

/// A reusable request: URL, method, headers and body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: HeaderList,
    pub body: RequestBody,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: HeaderList::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }
}

/// First argument of `fetch`: a URL or a prepared request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchInput {
    Url(String),
    Request(FetchRequest),
}

impl From<&str> for FetchInput {
    fn from(value: &str) -> Self {
        FetchInput::Url(value.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(value: String) -> Self {
        FetchInput::Url(value)
    }
}

impl From<Url> for FetchInput {
    fn from(value: Url) -> Self {
        FetchInput::Url(value.into())
    }
}

impl From<FetchRequest> for FetchInput {
    fn from(value: FetchRequest) -> Self {
        FetchInput::Request(value)
    }
}

/// Per-call options. Anything set here overrides the input request.
#[derive(Debug, Clone, Default)]
pub struct FetchInit {
    pub method: Option<String>,
    pub headers: HeaderList,
    pub body: Option<RequestBody>,
    pub signal: Option<AbortSignal>,
    pub max_redirects: Option<u32>,
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxySettings>,
    pub body_mode: Option<BodyMode>,
}

impl FetchInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn body_mode(mut self, mode: BodyMode) -> Self {
        self.body_mode = Some(mode);
        self
    }
}

/// A descriptor ready to send plus the client-only options.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub descriptor: RequestDescriptor,
    pub signal: Option<AbortSignal>,
    pub body_mode: Option<BodyMode>,
}

/// Merge `input` and `init` into a descriptor.
pub(crate) fn prepare(input: FetchInput, init: FetchInit) -> Result<PreparedRequest, BridgeError> {
    let request = match input {
        FetchInput::Url(url) => FetchRequest::new(url),
        FetchInput::Request(request) => request,
    };

    let url = Url::parse(&request.url).map_err(|e| {
        BridgeError::new(
            ErrorCode::FetchError,
            format!("Invalid URL '{}': {}", request.url, e),
        )
    })?;

    let method = init
        .method
        .unwrap_or(request.method)
        .to_ascii_uppercase();

    let mut headers = init.headers;
    let overridden: Vec<String> = headers.iter().map(|(k, _)| k.to_ascii_lowercase()).collect();
    for (name, value) in request.headers {
        if !overridden.contains(&name.to_ascii_lowercase()) {
            headers.append(name, value);
        }
    }

    let body = init.body.unwrap_or(request.body);
    match &body {
        RequestBody::Multipart(form) => {
            headers.remove(CONTENT_TYPE);
            headers.append(CONTENT_TYPE, form.content_type());
        }
        other => {
            if let Some(default) = other.default_content_type() {
                if !headers.contains(CONTENT_TYPE) {
                    headers.append(CONTENT_TYPE, default);
                }
            }
        }
    }

    let mut descriptor = RequestDescriptor {
        method,
        url: url.into(),
        headers,
        body: body.into_bytes(),
        timeout_ms: None,
        max_redirects: init.max_redirects,
        proxy: init.proxy,
    };
    descriptor.set_timeout(init.timeout);

    Ok(PreparedRequest {
        descriptor,
        signal: init.signal,
        body_mode: init.body_mode,
    })
}
