//! Host dispatch loop.
//!
//! # Responsibilities
//! - Read client messages from one channel endpoint
//! - Run each call on its own task and send exactly one reply
//! - Start stream pumps on start-stream
//! - Cancel everything still in flight when the channel closes

use tokio::sync::broadcast;

use crate::host::executor::HostExecutor;
use crate::protocol::{BridgeResult, Call, ClientMessage, HostMessage, Reply};
use crate::transport::HostEndpoint;

/// Serves one client connection.
pub struct HostServer {
    executor: HostExecutor,
}

impl HostServer {
    pub fn new(executor: HostExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &HostExecutor {
        &self.executor
    }

    /// Run until the client disconnects or shutdown is signalled.
    pub async fn serve(self, endpoint: HostEndpoint, mut shutdown: broadcast::Receiver<()>) {
        let HostEndpoint {
            outbound,
            mut inbound,
            ..
        } = endpoint;

        loop {
            let message = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Host server shutting down");
                    break;
                }
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => {
                        tracing::debug!("Client channel closed");
                        break;
                    }
                },
            };

            match message {
                ClientMessage::Call { call_id, call } => {
                    let executor = self.executor.clone();
                    let outbound = outbound.clone();
                    tokio::spawn(async move {
                        let name = call.name();
                        let result = dispatch(&executor, call).await;
                        if let Err(e) = &result {
                            tracing::debug!(call_id, call = name, error = %e, "Call rejected");
                        }
                        let reply = HostMessage::Reply { call_id, result };
                        if outbound.send(reply).await.is_err() {
                            tracing::debug!(call_id, call = name, "Reply dropped, client gone");
                        }
                    });
                }
                ClientMessage::StartStream { request_id } => {
                    let executor = self.executor.clone();
                    let outbound = outbound.clone();
                    tokio::spawn(async move {
                        executor.stream(request_id, &outbound).await;
                    });
                }
            }
        }

        self.executor.shutdown();
    }
}

async fn dispatch(executor: &HostExecutor, call: Call) -> BridgeResult<Reply> {
    match call {
        Call::RequestAccept { descriptor } => executor
            .accept(descriptor)
            .await
            .map(|metadata| Reply::Accepted { metadata }),
        Call::Cancel { request_id } => {
            executor.cancel(&request_id);
            Ok(Reply::Cancelled)
        }
        Call::GetBody { request_id } => executor
            .get_body(&request_id)
            .await
            .map(|data| Reply::Body { data }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::host::executor::ExecutorSettings;
    use crate::host::fetcher::{FetchCall, FetchFailure, FetchedResponse, HttpFetcher};
    use crate::protocol::{ErrorCode, RequestDescriptor, RequestId};
    use crate::transport::memory;

    struct Hanging;

    #[async_trait]
    impl HttpFetcher for Hanging {
        async fn fetch(
            &self,
            _call: FetchCall,
            cancel: CancellationToken,
        ) -> Result<FetchedResponse, FetchFailure> {
            cancel.cancelled().await;
            Err(FetchFailure::Cancelled)
        }
    }

    #[tokio::test]
    async fn replies_carry_the_call_id() {
        let executor = HostExecutor::new(Arc::new(Hanging), ExecutorSettings::default());
        let (mut client, host) = memory::pair(8);
        let (_tx, rx) = broadcast::channel(1);
        tokio::spawn(HostServer::new(executor).serve(host, rx));

        client
            .outbound
            .send(ClientMessage::Call {
                call_id: 42,
                call: Call::GetBody {
                    request_id: RequestId::from("missing"),
                },
            })
            .await
            .unwrap();

        match client.inbound.recv().await.unwrap() {
            HostMessage::Reply { call_id, result } => {
                assert_eq!(call_id, 42);
                assert_eq!(result.unwrap_err().code, ErrorCode::IdNotFound);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn disconnect_cancels_in_flight_requests() {
        let executor = HostExecutor::new(Arc::new(Hanging), ExecutorSettings::default());
        let registry = executor.registry().clone();
        let (client, host) = memory::pair(8);
        let (_tx, rx) = broadcast::channel(1);
        let server = tokio::spawn(HostServer::new(executor).serve(host, rx));

        client
            .outbound
            .send(ClientMessage::Call {
                call_id: 1,
                call: Call::RequestAccept {
                    descriptor: RequestDescriptor::new("GET", "http://x.test/"),
                },
            })
            .await
            .unwrap();
        while registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        drop(client);
        server.await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() {
        let executor = HostExecutor::new(Arc::new(Hanging), ExecutorSettings::default());
        let (_client, host) = memory::pair(8);
        let (tx, rx) = broadcast::channel(1);
        let server = tokio::spawn(HostServer::new(executor).serve(host, rx));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .unwrap()
            .unwrap();
    }
}
