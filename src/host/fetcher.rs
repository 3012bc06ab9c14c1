//! The HTTP client capability consumed by the host executor.
//!
//! # Responsibilities
//! - Define the [`HttpFetcher`] / [`BodyReader`] seam
//! - Provide the production implementation on top of reqwest
//! - Map proxy settings and redirect limits onto reqwest clients
//!
//! # Design Decisions
//! - The executor owns timeouts; the fetcher only observes the cancellation token
//! - A shared default client is reused unless a request needs its own
//!   proxy or redirect policy
//! - Responses that cannot carry a body (HEAD, 1xx, 204, 205, 304) report `body: None`

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Method, NoProxy, Proxy};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::HostConfig;
use crate::protocol::{HeaderList, ProxySettings, ProxyTarget, RequestDescriptor};

/// Errors produced by the HTTP client.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("body read failed: {0}")]
    Body(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Request handed to the HTTP client.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
    pub body: Option<Bytes>,
    pub max_redirects: Option<u32>,
    pub proxy: Option<ProxySettings>,
}

impl From<&RequestDescriptor> for FetchCall {
    fn from(descriptor: &RequestDescriptor) -> Self {
        Self {
            method: descriptor.method.clone(),
            url: descriptor.url.clone(),
            headers: descriptor.headers.clone(),
            body: descriptor.body.clone(),
            max_redirects: descriptor.max_redirects,
            proxy: descriptor.proxy.clone(),
        }
    }
}

/// Incremental access to a response body.
#[async_trait]
pub trait BodyReader: Send {
    /// Next chunk, or `None` at end of data.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchFailure>;

    /// Drain the remaining body into one buffer.
    async fn read_all(&mut self) -> Result<Bytes, FetchFailure> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// A body served from pre-split chunks, optionally failing at the end.
#[derive(Debug, Default)]
pub struct ChunkedBody {
    chunks: std::collections::VecDeque<Bytes>,
    failure: Option<String>,
}

impl ChunkedBody {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            failure: None,
        }
    }

    /// Fail with `message` once the chunks are exhausted.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl BodyReader for ChunkedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchFailure> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        match self.failure.take() {
            Some(message) => Err(FetchFailure::Body(message)),
            None => Ok(None),
        }
    }
}

/// A response head plus its (optional) body.
pub struct FetchedResponse {
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub headers: HeaderList,
    pub body: Option<Box<dyn BodyReader>>,
}

impl fmt::Debug for FetchedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Performs real network requests on behalf of the executor.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(
        &self,
        call: FetchCall,
        cancel: CancellationToken,
    ) -> Result<FetchedResponse, FetchFailure>;
}

/// [`HttpFetcher`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    user_agent: String,
    max_redirects: u32,
}

impl ReqwestFetcher {
    /// Create a fetcher from host configuration.
    pub fn new(config: &HostConfig) -> Result<Self, FetchFailure> {
        let client = build_client(&config.user_agent, config.max_redirects, None)?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            max_redirects: config.max_redirects,
        })
    }

    fn client_for(&self, call: &FetchCall) -> Result<reqwest::Client, FetchFailure> {
        let proxy = call.proxy.as_ref().filter(|p| !p.is_empty());
        let max_redirects = call.max_redirects.unwrap_or(self.max_redirects);
        if proxy.is_none() && max_redirects == self.max_redirects {
            return Ok(self.client.clone());
        }
        build_client(&self.user_agent, max_redirects, proxy)
    }
}

impl fmt::Debug for ReqwestFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestFetcher")
            .field("user_agent", &self.user_agent)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

fn build_client(
    user_agent: &str,
    max_redirects: u32,
    proxy: Option<&ProxySettings>,
) -> Result<reqwest::Client, FetchFailure> {
    let policy = if max_redirects == 0 {
        Policy::none()
    } else {
        Policy::limited(max_redirects as usize)
    };
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(policy);

    if let Some(settings) = proxy {
        if let Some(target) = &settings.all {
            builder = builder.proxy(build_proxy(ProxyScope::All, target)?);
        }
        if let Some(target) = &settings.http {
            builder = builder.proxy(build_proxy(ProxyScope::Http, target)?);
        }
        if let Some(target) = &settings.https {
            builder = builder.proxy(build_proxy(ProxyScope::Https, target)?);
        }
    }

    builder
        .build()
        .map_err(|e| FetchFailure::InvalidRequest(format!("failed to build client: {}", e)))
}

#[derive(Debug, Clone, Copy)]
enum ProxyScope {
    All,
    Http,
    Https,
}

fn build_proxy(scope: ProxyScope, target: &ProxyTarget) -> Result<Proxy, FetchFailure> {
    let endpoint = target.endpoint();
    let url = endpoint.url.as_str();
    let proxy = match scope {
        ProxyScope::All => Proxy::all(url),
        ProxyScope::Http => Proxy::http(url),
        ProxyScope::Https => Proxy::https(url),
    }
    .map_err(|e| FetchFailure::InvalidRequest(format!("invalid proxy '{}': {}", url, e)))?;

    let proxy = match &endpoint.basic_auth {
        Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
        None => proxy,
    };
    Ok(match &endpoint.no_proxy {
        Some(list) => proxy.no_proxy(NoProxy::from_string(list)),
        None => proxy,
    })
}

fn to_header_map(headers: &HeaderList) -> Result<HeaderMap, FetchFailure> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchFailure::InvalidRequest(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchFailure::InvalidRequest(format!("invalid value for '{}': {}", name, e)))?;
        map.append(name, value);
    }
    Ok(map)
}

fn from_header_map(headers: &HeaderMap) -> HeaderList {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn response_has_body(method: &Method, status: u16) -> bool {
    *method != Method::HEAD && !matches!(status, 101 | 103 | 204 | 205 | 304)
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        call: FetchCall,
        cancel: CancellationToken,
    ) -> Result<FetchedResponse, FetchFailure> {
        let client = self.client_for(&call)?;
        let method = Method::from_bytes(call.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| FetchFailure::InvalidRequest(format!("invalid method '{}': {}", call.method, e)))?;

        let mut request = client
            .request(method.clone(), call.url.as_str())
            .headers(to_header_map(&call.headers)?);
        if let Some(body) = call.body {
            request = request.body(body);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
            result = request.send() => result.map_err(|e| FetchFailure::Request(e.to_string()))?,
        };

        let status = response.status();
        let url = response.url().to_string();
        let headers = from_header_map(response.headers());
        tracing::debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            "Upstream responded"
        );

        let body = if response_has_body(&method, status.as_u16()) {
            Some(Box::new(ReqwestBody { response }) as Box<dyn BodyReader>)
        } else {
            None
        };

        Ok(FetchedResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url,
            headers,
            body,
        })
    }
}

struct ReqwestBody {
    response: reqwest::Response,
}

#[async_trait]
impl BodyReader for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchFailure> {
        self.response
            .chunk()
            .await
            .map_err(|e| FetchFailure::Body(e.to_string()))
    }
}
