//! Concurrency: many requests share one channel without cross-talk.

use std::time::{Duration, Instant};

use fetch_bridge::client::FetchInit;
use fetch_bridge::config::BodyMode;

mod common;

use common::{start_bridge, Scripted, ScriptedFetcher};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_cross_talk() {
    let concurrency = 20;
    let requests_per_task = 25;

    let mut fetcher = ScriptedFetcher::new();
    let bodies: Vec<&'static str> = (0..concurrency)
        .map(|i| &*Box::leak(format!("body-{i}").into_boxed_str()))
        .collect();
    for (i, body) in bodies.iter().enumerate() {
        fetcher = fetcher.route(
            &format!("http://upstream.test/{i}"),
            Scripted::ok([*body]).delay(Duration::from_millis((i % 5) as u64)),
        );
    }

    for mode in [BodyMode::Buffered, BodyMode::Streaming] {
        let bridge = start_bridge(fetcher.clone(), mode);
        let start = Instant::now();

        let mut tasks = Vec::new();
        for i in 0..concurrency {
            let gateway = bridge.gateway.clone();
            let expected = bodies[i];
            tasks.push(tokio::spawn(async move {
                for _ in 0..requests_per_task {
                    let response = gateway
                        .fetch(format!("http://upstream.test/{i}"), FetchInit::new())
                        .await
                        .unwrap();
                    assert_eq!(response.text().await.unwrap(), expected);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        println!(
            "{:?}: {} requests in {:?}",
            mode,
            concurrency * requests_per_task,
            start.elapsed()
        );
        assert!(bridge.registry.is_empty());
        assert_eq!(bridge.gateway.client().unwrap().pending_calls(), 0);
    }
}
