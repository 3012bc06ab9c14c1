//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use fetch_bridge::client::{BridgeClient, FetchGateway};
use fetch_bridge::config::{BodyMode, ClientConfig};
use fetch_bridge::host::{
    BodyReader, ChunkedBody, ExecutorSettings, FetchCall, FetchFailure, FetchedResponse,
    HostExecutor, HostServer, HttpFetcher, Registry,
};
use fetch_bridge::protocol::HeaderList;
use fetch_bridge::transport::memory;

/// One scripted upstream response.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub chunks: Vec<Bytes>,
    pub delay: Duration,
    pub body_failure: Option<&'static str>,
    /// Hold each chunk back by this long.
    pub chunk_delay: Duration,
}

impl Scripted {
    pub fn ok<I: IntoIterator<Item = &'static str>>(chunks: I) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type", "text/plain")],
            chunks: chunks
                .into_iter()
                .map(|s| Bytes::from_static(s.as_bytes()))
                .collect(),
            delay: Duration::ZERO,
            body_failure: None,
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name, value));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn fail_body(mut self, message: &'static str) -> Self {
        self.body_failure = Some(message);
        self
    }
}

/// Body reader that sleeps between chunks and observes nothing else.
struct SlowBody {
    inner: ChunkedBody,
    delay: Duration,
}

#[async_trait]
impl BodyReader for SlowBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchFailure> {
        tokio::time::sleep(self.delay).await;
        self.inner.next_chunk().await
    }
}

/// An [`HttpFetcher`] answering from a URL → response table.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    routes: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<FetchCall>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, response: Scripted) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        call: FetchCall,
        cancel: CancellationToken,
    ) -> Result<FetchedResponse, FetchFailure> {
        self.calls.lock().unwrap().push(call.clone());
        let scripted = self.routes.lock().unwrap().get(&call.url).cloned();
        let Some(scripted) = scripted else {
            return Err(FetchFailure::Request(format!("connection refused: {}", call.url)));
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
            _ = tokio::time::sleep(scripted.delay) => {}
        }

        let mut body = ChunkedBody::new(scripted.chunks);
        if let Some(message) = scripted.body_failure {
            body = body.then_fail(message);
        }
        let body: Box<dyn BodyReader> = if scripted.chunk_delay.is_zero() {
            Box::new(body)
        } else {
            Box::new(SlowBody {
                inner: body,
                delay: scripted.chunk_delay,
            })
        };

        Ok(FetchedResponse {
            status: scripted.status,
            status_text: if scripted.status == 200 { "OK".into() } else { String::new() },
            url: call.url,
            headers: scripted.headers.into_iter().collect::<HeaderList>(),
            body: Some(body),
        })
    }
}

/// A client gateway wired to an in-process host.
pub struct Bridge {
    pub gateway: FetchGateway,
    pub registry: Registry,
    pub shutdown: broadcast::Sender<()>,
}

/// Start a host server over an in-process channel and return the client side.
pub fn start_bridge(fetcher: impl HttpFetcher + 'static, body_mode: BodyMode) -> Bridge {
    start_bridge_with(fetcher, body_mode, ExecutorSettings::default())
}

pub fn start_bridge_with(
    fetcher: impl HttpFetcher + 'static,
    body_mode: BodyMode,
    settings: ExecutorSettings,
) -> Bridge {
    let executor = HostExecutor::new(Arc::new(fetcher), settings);
    let registry = executor.registry().clone();
    let (client, host) = memory::pair(64);
    let (shutdown, rx) = broadcast::channel(1);
    tokio::spawn(HostServer::new(executor).serve(host, rx));

    let config = ClientConfig {
        body_mode,
        ..ClientConfig::default()
    };
    Bridge {
        gateway: FetchGateway::new(BridgeClient::connect(client), &config),
        registry,
        shutdown,
    }
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Start a mock backend that returns a fixed response. Returns its address.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_line = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
