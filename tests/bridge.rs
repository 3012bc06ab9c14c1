//! Request/response round trips over an in-process channel.

use std::time::Duration;

use fetch_bridge::client::{AbortController, FetchInit, FetchRequest, MultipartForm};
use fetch_bridge::config::BodyMode;
use fetch_bridge::protocol::ErrorCode;

mod common;

use common::{eventually, start_bridge, Scripted, ScriptedFetcher};

#[tokio::test]
async fn test_buffered_get() {
    let fetcher = ScriptedFetcher::new().route("http://upstream.test/hello", Scripted::ok(["hello"]));
    let bridge = start_bridge(fetcher, BodyMode::Buffered);

    let response = bridge
        .gateway
        .fetch("http://upstream.test/hello", FetchInit::new())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.ok());
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert_eq!(response.text().await.unwrap(), "hello");
    assert!(bridge.registry.is_empty());
}

#[tokio::test]
async fn test_request_details_reach_the_fetcher() {
    let fetcher = ScriptedFetcher::new().route("http://upstream.test/items", Scripted::ok(["{}"]).status(201));
    let bridge = start_bridge(fetcher.clone(), BodyMode::Buffered);

    let request = FetchRequest::new("http://upstream.test/items")
        .method("post")
        .header("X-Trace", "abc")
        .header("Accept", "text/html");
    let init = FetchInit::new()
        .header("accept", "application/json")
        .body(vec![0u8, 159, 146, 150])
        .max_redirects(2);

    let response = bridge.gateway.fetch(request, init).await.unwrap();
    assert_eq!(response.status(), 201);

    let calls = fetcher.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.method, "POST");
    assert_eq!(call.headers.get("x-trace"), Some("abc"));
    assert_eq!(call.headers.get_all("accept").collect::<Vec<_>>(), vec!["application/json"]);
    assert_eq!(call.body.as_deref(), Some(&[0u8, 159, 146, 150][..]));
    assert_eq!(call.max_redirects, Some(2));
}

#[tokio::test]
async fn test_multipart_body_crosses_with_boundary() {
    let fetcher = ScriptedFetcher::new().route("http://upstream.test/upload", Scripted::ok(["ok"]));
    let bridge = start_bridge(fetcher.clone(), BodyMode::Buffered);

    let form = MultipartForm::new()
        .text("title", "report")
        .file("file", "a.txt", "text/plain", &b"contents"[..]);
    let boundary = form.boundary().to_string();
    let init = FetchInit::new()
        .method("POST")
        .header("Content-Type", "application/octet-stream")
        .body(form);

    bridge
        .gateway
        .fetch("http://upstream.test/upload", init)
        .await
        .unwrap();

    let call = fetcher.calls().remove(0);
    assert_eq!(
        call.headers.get("content-type"),
        Some(format!("multipart/form-data; boundary={}", boundary).as_str())
    );
    let body = String::from_utf8(call.body.unwrap().to_vec()).unwrap();
    assert!(body.contains("filename=\"a.txt\""));
    assert!(body.contains("contents"));
}

#[tokio::test]
async fn test_get_body_twice_is_id_not_found() {
    let fetcher = ScriptedFetcher::new().route("http://upstream.test/once", Scripted::ok(["x"]));
    let bridge = start_bridge(fetcher, BodyMode::Buffered);

    let response = bridge
        .gateway
        .fetch("http://upstream.test/once", FetchInit::new())
        .await
        .unwrap();
    let request_id = response.request_id().clone();
    assert_eq!(response.bytes().await.unwrap(), "x");

    let client = bridge.gateway.client().unwrap();
    let err = client
        .call(fetch_bridge::protocol::Call::GetBody { request_id })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::IdNotFound);
}

#[tokio::test]
async fn test_fetch_failure_is_fetch_request_error() {
    let bridge = start_bridge(ScriptedFetcher::new(), BodyMode::Buffered);

    let err = bridge
        .gateway
        .fetch("http://unrouted.test/", FetchInit::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FetchRequestError);
    assert!(bridge.registry.is_empty());
}

#[tokio::test]
async fn test_abort_during_body_read() {
    let fetcher = ScriptedFetcher::new().route(
        "http://upstream.test/slow-body",
        Scripted::ok(["a", "b", "c"]).chunk_delay(Duration::from_secs(30)),
    );
    let bridge = start_bridge(fetcher, BodyMode::Buffered);
    let controller = AbortController::new();

    let fetch = tokio::spawn({
        let gateway = bridge.gateway.clone();
        let init = FetchInit::new().signal(controller.signal());
        async move { gateway.fetch("http://upstream.test/slow-body", init).await }
    });

    let registry = bridge.registry.clone();
    assert!(eventually(|| !registry.is_empty()).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.abort();

    let err = fetch.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::Aborted);
    let registry = bridge.registry.clone();
    assert!(eventually(|| registry.is_empty()).await);
}

#[tokio::test]
async fn test_cancel_unknown_id_is_noop() {
    let fetcher = ScriptedFetcher::new().route("http://upstream.test/", Scripted::ok(["x"]));
    let bridge = start_bridge(fetcher, BodyMode::Buffered);
    let client = bridge.gateway.client().unwrap();

    client.cancel(&"fetch-bridge:0-unknown".into());

    let response = bridge
        .gateway
        .fetch("http://upstream.test/", FetchInit::new())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "x");
}
