//! Fetch-style entry point for code that cannot reach the network itself.
//!
//! # Responsibilities
//! - Turn `fetch(input, init)` into request-accept / get-body / start-stream
//! - Honour the abort signal at every stage
//! - Hand back metadata and a buffered or streamed body
//!
//! # Design Decisions
//! - The gateway never performs network I/O
//! - An abort that races request-accept returns immediately; the late
//!   identifier (if any) is cancelled in the background

use crate::client::abort::AbortSignal;
use crate::client::body::{BodyStream, FetchResponse, ResponseBody};
use crate::client::channel::BridgeClient;
use crate::client::request::{prepare, FetchInit, FetchInput, PreparedRequest};
use crate::config::{BodyMode, ClientConfig};
use crate::protocol::{BridgeError, BridgeResult, Call, ErrorCode, Reply, RequestId, ResponseMetadata};

/// Client-side fetch implementation over a [`BridgeClient`].
#[derive(Debug, Clone)]
pub struct FetchGateway {
    client: Option<BridgeClient>,
    body_mode: BodyMode,
}

impl FetchGateway {
    pub fn new(client: BridgeClient, config: &ClientConfig) -> Self {
        Self {
            client: Some(client),
            body_mode: config.body_mode,
        }
    }

    /// A gateway with no bridge behind it. Every fetch fails with `API_NOT_FOUND`.
    pub fn disconnected() -> Self {
        Self {
            client: None,
            body_mode: BodyMode::default(),
        }
    }

    pub fn body_mode(&self) -> BodyMode {
        self.body_mode
    }

    pub fn client(&self) -> Option<&BridgeClient> {
        self.client.as_ref()
    }

    /// Perform a request through the host.
    pub async fn fetch(
        &self,
        input: impl Into<FetchInput>,
        init: FetchInit,
    ) -> BridgeResult<FetchResponse> {
        let client = match &self.client {
            Some(client) if !client.is_closed() => client.clone(),
            _ => return Err(BridgeError::api_not_found()),
        };

        if init.signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Err(BridgeError::aborted());
        }

        let PreparedRequest {
            descriptor,
            signal,
            body_mode,
        } = prepare(input.into(), init)?;
        let body_mode = body_mode.unwrap_or(self.body_mode);

        tracing::debug!(
            method = %descriptor.method,
            url = %descriptor.url,
            body_mode = ?body_mode,
            "Forwarding request to host"
        );

        let metadata = accept(&client, Call::RequestAccept { descriptor }, signal.as_ref()).await?;
        let request_id = metadata.request_id.clone();

        if signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            client.cancel(&request_id);
            return Err(BridgeError::aborted());
        }

        let body = match body_mode {
            BodyMode::Buffered => {
                ResponseBody::Buffered(buffered_body(&client, &request_id, signal.as_ref()).await?)
            }
            BodyMode::Streaming => {
                let events = client.start_stream(&request_id).await?;
                ResponseBody::Streaming(BodyStream::new(request_id, events, client, signal))
            }
        };

        Ok(FetchResponse::new(metadata, body))
    }
}

async fn accept(
    client: &BridgeClient,
    call: Call,
    signal: Option<&AbortSignal>,
) -> BridgeResult<ResponseMetadata> {
    let mut pending = Box::pin({
        let client = client.clone();
        async move { client.call(call).await }
    });

    let reply = match signal {
        Some(signal) => {
            let outcome = tokio::select! {
                biased;
                _ = signal.wait() => None,
                reply = &mut pending => Some(reply),
            };
            match outcome {
                Some(reply) => reply,
                None => {
                    let client = client.clone();
                    tokio::spawn(async move {
                        if let Ok(Reply::Accepted { metadata }) = pending.await {
                            tracing::debug!(request_id = %metadata.request_id, "Cancelling late accept");
                            client.cancel(&metadata.request_id);
                        }
                    });
                    return Err(BridgeError::aborted());
                }
            }
        }
        None => pending.await,
    };

    match reply {
        Ok(Reply::Accepted { metadata }) => Ok(metadata),
        Ok(other) => Err(unexpected_reply("request-accept", &other)),
        Err(e) if signal.is_some_and(AbortSignal::is_aborted) => {
            tracing::debug!(error = %e, "Accept failed after abort");
            Err(BridgeError::aborted())
        }
        Err(e) => Err(e),
    }
}

async fn buffered_body(
    client: &BridgeClient,
    request_id: &RequestId,
    signal: Option<&AbortSignal>,
) -> BridgeResult<bytes::Bytes> {
    let call = Call::GetBody {
        request_id: request_id.clone(),
    };

    let reply = match signal {
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.wait() => {
                    client.cancel(request_id);
                    return Err(BridgeError::aborted());
                }
                reply = client.call(call) => reply,
            }
        }
        None => client.call(call).await,
    };

    match reply {
        Ok(Reply::Body { data }) => Ok(data),
        Ok(other) => Err(unexpected_reply("get-body", &other)),
        Err(_) if signal.is_some_and(AbortSignal::is_aborted) => Err(BridgeError::aborted()),
        Err(e) => Err(e),
    }
}

fn unexpected_reply(call: &str, reply: &Reply) -> BridgeError {
    BridgeError::new(
        ErrorCode::FetchError,
        format!("unexpected reply to {}: {:?}", call, reply),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::abort::AbortController;
    use crate::protocol::{ClientMessage, HeaderList, HostMessage};
    use crate::transport::memory;

    #[tokio::test]
    async fn missing_bridge_is_api_not_found() {
        let gateway = FetchGateway::disconnected();
        let err = gateway.fetch("http://x.test/", FetchInit::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiNotFound);
    }

    #[tokio::test]
    async fn pre_aborted_signal_sends_nothing() {
        let (client, mut host) = memory::pair(8);
        let gateway = FetchGateway::new(BridgeClient::connect(client), &ClientConfig::default());

        let init = FetchInit::new().signal(AbortSignal::aborted());
        let err = gateway.fetch("http://x.test/", init).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Aborted);
        assert!(host.inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn abort_during_accept_cancels_late_id() {
        let (client, mut host) = memory::pair(8);
        let gateway = FetchGateway::new(BridgeClient::connect(client), &ClientConfig::default());
        let controller = AbortController::new();

        let fetch = tokio::spawn({
            let gateway = gateway.clone();
            let init = FetchInit::new().signal(controller.signal());
            async move { gateway.fetch("http://x.test/", init).await }
        });

        let Some(ClientMessage::Call { call_id, .. }) = host.inbound.recv().await else {
            panic!("expected request-accept");
        };
        controller.abort();
        let err = fetch.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::Aborted);

        let request_id = RequestId::from("late-id");
        host.outbound
            .send(HostMessage::Reply {
                call_id,
                result: Ok(Reply::Accepted {
                    metadata: ResponseMetadata {
                        request_id: request_id.clone(),
                        status: 200,
                        status_text: "OK".into(),
                        url: "http://x.test/".into(),
                        headers: HeaderList::new(),
                    },
                }),
            })
            .await
            .unwrap();

        match host.inbound.recv().await {
            Some(ClientMessage::Call {
                call: Call::Cancel { request_id: cancelled },
                ..
            }) => assert_eq!(cancelled, request_id),
            other => panic!("expected cancel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn host_errors_pass_through() {
        let (client, mut host) = memory::pair(8);
        let gateway = FetchGateway::new(BridgeClient::connect(client), &ClientConfig::default());

        tokio::spawn(async move {
            if let Some(ClientMessage::Call { call_id, .. }) = host.inbound.recv().await {
                let _ = host
                    .outbound
                    .send(HostMessage::Reply {
                        call_id,
                        result: Err(BridgeError::timeout()),
                    })
                    .await;
            }
            host
        });

        let err = gateway.fetch("http://x.test/", FetchInit::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }
}
