//! Journey: many clients on one server
//!
//! Sessions handshake and call tools in parallel without seeing each
//! other's traffic; broadcasts reach every live session, and closing one
//! session leaves the rest untouched.

use serde_json::json;
use tessera_core::prelude::*;
use tessera_core::protocol::methods;
use tessera_e2e_tests::TestHarness;

const CLIENTS: i64 = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_sessions_stay_isolated() {
    let harness = TestHarness::with_fixtures();

    let mut tasks = Vec::new();
    for n in 0..CLIENTS {
        let mut client = harness.connect();
        tasks.push(tokio::spawn(async move {
            client.initialize().await;
            let mut sums = Vec::new();
            for round in 0..10 {
                let result = client
                    .call(
                        methods::TOOLS_CALL,
                        json!({"name": "calculator", "arguments": {"a": n, "b": round}}),
                    )
                    .await;
                sums.push(result["content"][0]["text"].as_str().unwrap().to_string());
            }
            (n, sums, client.pending_messages().len())
        }));
    }

    for task in tasks {
        let (n, sums, stray) = task.await.unwrap();
        let expected: Vec<String> = (0..10).map(|round| (n + round).to_string()).collect();
        assert_eq!(sums, expected);
        assert_eq!(stray, 0, "client {} saw foreign traffic", n);
    }

    assert_eq!(harness.provider.session_count(), CLIENTS as usize);
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let harness = TestHarness::with_fixtures();
    let clients: Vec<_> = (0..CLIENTS).map(|_| harness.connect()).collect();

    let mut ids: Vec<&str> = clients.iter().map(|c| c.session().id()).collect();
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), CLIENTS as usize);
}

#[tokio::test]
async fn test_broadcast_reaches_every_session() {
    let harness = TestHarness::with_fixtures();
    let mut first = harness.connect_initialized().await;
    let mut second = harness.connect_initialized().await;
    // Broadcasts do not wait for the handshake
    let mut fresh = harness.connect();

    harness
        .server
        .notify_clients("notifications/custom", Some(json!({"seq": 1})))
        .await;

    for client in [&mut first, &mut second, &mut fresh] {
        let notification = client.next_notification().await;
        assert_eq!(notification.method, "notifications/custom");
        assert_eq!(notification.params, Some(json!({"seq": 1})));
    }
}

#[tokio::test]
async fn test_closing_one_session_leaves_others_running() {
    let harness = TestHarness::with_fixtures();
    let leaving = harness.connect_initialized().await;
    let mut staying = harness.connect_initialized().await;

    leaving.session().close().await;

    assert!(leaving.session().is_closed());
    assert_eq!(harness.provider.session_count(), 1);
    assert_eq!(staying.call(methods::PING, json!({})).await, json!({}));

    harness
        .server
        .notify_clients(methods::NOTIFICATION_TOOLS_LIST_CHANGED, None)
        .await;
    assert_eq!(
        staying.next_notification().await.method,
        methods::NOTIFICATION_TOOLS_LIST_CHANGED
    );
}

#[tokio::test]
async fn test_server_close_ends_every_session() {
    let harness = TestHarness::with_fixtures();
    let first = harness.connect_initialized().await;
    let second = harness.connect_initialized().await;

    harness.server.close().await;

    assert!(first.session().is_closed());
    assert!(second.session().is_closed());
    assert_eq!(first.session().state(), SessionState::Closed);
    assert_eq!(harness.provider.session_count(), 0);
}
