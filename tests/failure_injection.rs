//! Failure injection: timeouts, aborts and a vanishing host.

use std::time::Duration;

use fetch_bridge::client::{
    AbortController, AbortSignal, AdapterError, AdapterRequest, BridgeClient, FetchGateway, FetchInit,
    HttpAdapter,
};
use fetch_bridge::config::{BodyMode, ClientConfig};
use fetch_bridge::protocol::ErrorCode;
use fetch_bridge::transport::memory;

mod common;

use common::{eventually, start_bridge, Scripted, ScriptedFetcher};

#[tokio::test]
async fn test_short_timeout_is_timeout() {
    let fetcher = ScriptedFetcher::new().route(
        "http://upstream.test/slow",
        Scripted::ok(["late"]).delay(Duration::from_millis(200)),
    );
    let bridge = start_bridge(fetcher, BodyMode::Buffered);

    let err = bridge
        .gateway
        .fetch(
            "http://upstream.test/slow",
            FetchInit::new().timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
    assert!(bridge.registry.is_empty());
}

#[tokio::test]
async fn test_sub_millisecond_timeout_still_applies() {
    let fetcher = ScriptedFetcher::new().route(
        "http://upstream.test/slow",
        Scripted::ok(["late"]).delay(Duration::from_millis(200)),
    );
    let bridge = start_bridge(fetcher, BodyMode::Buffered);

    let err = bridge
        .gateway
        .fetch(
            "http://upstream.test/slow",
            FetchInit::new().timeout(Duration::from_micros(500)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);

    let adapter = HttpAdapter::new(bridge.gateway.clone());
    let err = adapter
        .request(AdapterRequest::new("GET", "http://upstream.test/slow").timeout(Duration::from_micros(500)))
        .await
        .unwrap_err();
    match err {
        AdapterError::Fetch(e) => assert_eq!(e.code, ErrorCode::Timeout),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreached_timeout_has_no_effect() {
    let fetcher = ScriptedFetcher::new().route(
        "http://upstream.test/slow",
        Scripted::ok(["in time"]).delay(Duration::from_millis(20)),
    );
    let bridge = start_bridge(fetcher, BodyMode::Buffered);

    let response = bridge
        .gateway
        .fetch(
            "http://upstream.test/slow",
            FetchInit::new().timeout(Duration::from_millis(1000)),
        )
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "in time");
}

#[tokio::test]
async fn test_abort_before_metadata() {
    let fetcher = ScriptedFetcher::new().route(
        "http://upstream.test/hang",
        Scripted::ok(["never"]).delay(Duration::from_secs(30)),
    );
    let bridge = start_bridge(fetcher, BodyMode::Buffered);
    let controller = AbortController::new();

    let fetch = tokio::spawn({
        let gateway = bridge.gateway.clone();
        let init = FetchInit::new().signal(controller.signal());
        async move { gateway.fetch("http://upstream.test/hang", init).await }
    });

    let registry = bridge.registry.clone();
    assert!(eventually(|| !registry.is_empty()).await);
    controller.abort();

    let err = fetch.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::Aborted);
}

#[tokio::test]
async fn test_pre_aborted_signal() {
    let fetcher = ScriptedFetcher::new().route("http://upstream.test/", Scripted::ok(["x"]));
    let bridge = start_bridge(fetcher.clone(), BodyMode::Buffered);

    let err = bridge
        .gateway
        .fetch(
            "http://upstream.test/",
            FetchInit::new().signal(AbortSignal::aborted()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Aborted);
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_host_disconnect_fails_pending_fetch() {
    let (client, host) = memory::pair(8);
    let gateway = FetchGateway::new(BridgeClient::connect(client), &ClientConfig::default());

    let fetch = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.fetch("http://upstream.test/", FetchInit::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(host);

    let err = fetch.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::FetchError);

    let client = gateway.client().unwrap().clone();
    client.closed().await;
    let err = gateway
        .fetch("http://upstream.test/", FetchInit::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ApiNotFound);
}

#[tokio::test]
async fn test_host_shutdown_cancels_in_flight() {
    let fetcher = ScriptedFetcher::new().route(
        "http://upstream.test/hang",
        Scripted::ok(["never"]).delay(Duration::from_secs(30)),
    );
    let bridge = start_bridge(fetcher, BodyMode::Buffered);

    let fetch = tokio::spawn({
        let gateway = bridge.gateway.clone();
        async move { gateway.fetch("http://upstream.test/hang", FetchInit::new()).await }
    });
    let registry = bridge.registry.clone();
    assert!(eventually(|| !registry.is_empty()).await);

    bridge.shutdown.send(()).unwrap();

    let err = fetch.await.unwrap().unwrap_err();
    assert!(matches!(err.code, ErrorCode::Aborted | ErrorCode::FetchError));
    assert!(bridge.registry.is_empty());
}
