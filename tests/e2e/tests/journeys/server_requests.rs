//! Journey: the server asks the client
//!
//! Roots and sampling requests travel server → client and are answered by
//! the client; log messages are filtered by the level the client chose.

use std::time::Duration;

use serde_json::json;
use tessera_core::prelude::*;
use tessera_core::protocol::messages::{
    CreateMessageRequest, LoggingLevel, Role, SamplingMessage,
};
use tessera_core::protocol::methods;
use tessera_e2e_tests::TestHarness;

#[tokio::test]
async fn test_list_roots_round_trip() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect();
    client
        .initialize_with("2024-11-05", json!({"roots": {"listChanged": true}}))
        .await;

    let session = client.session().clone();
    let asking = tokio::spawn(async move { session.list_roots().await });

    let request = client.next_request().await;
    assert_eq!(request.method, methods::ROOTS_LIST);
    client
        .respond(
            request.id,
            json!({"roots": [{"uri": "file:///workspace", "name": "workspace"}]}),
        )
        .await;

    let roots = asking.await.unwrap().unwrap();
    assert_eq!(roots.roots.len(), 1);
    assert_eq!(roots.roots[0].uri, "file:///workspace");
}

#[tokio::test]
async fn test_roots_require_client_capability() {
    let harness = TestHarness::with_fixtures();
    let client = harness.connect_initialized().await;

    let result = client.session().list_roots().await;

    assert!(matches!(result, Err(McpError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_sampling_round_trip() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect();
    client
        .initialize_with("2024-11-05", json!({"sampling": {}}))
        .await;

    let session = client.session().clone();
    let asking = tokio::spawn(async move {
        session
            .create_message(CreateMessageRequest {
                messages: vec![SamplingMessage {
                    role: Role::User,
                    content: Content::text("Summarize the weather"),
                }],
                model_preferences: None,
                system_prompt: None,
                include_context: None,
                temperature: None,
                max_tokens: 64,
                stop_sequences: None,
                metadata: None,
            })
            .await
    });

    let request = client.next_request().await;
    assert_eq!(request.method, methods::SAMPLING_CREATE_MESSAGE);
    assert_eq!(request.params.as_ref().unwrap()["maxTokens"], 64);
    client
        .respond(
            request.id,
            json!({
                "role": "assistant",
                "content": {"type": "text", "text": "Sunny all week"},
                "model": "test-model",
                "stopReason": "endTurn"
            }),
        )
        .await;

    let result = asking.await.unwrap().unwrap();
    assert_eq!(result.model, "test-model");
    assert_eq!(result.content.as_text(), Some("Sunny all week"));
}

#[tokio::test]
async fn test_client_error_reaches_the_server() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let pending = client
        .session()
        .send_request("custom/ask", None)
        .await
        .unwrap();

    let request = client.next_request().await;
    assert_eq!(&request.id, pending.id());
    client.send_error(request.id, -32000, "declined").await;

    match pending.response_timeout(Duration::from_secs(1)).await {
        Err(McpError::Remote(error)) => {
            assert_eq!(error.code, -32000);
            assert_eq!(error.message, "declined");
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_closing_fails_outstanding_requests() {
    let harness = TestHarness::with_fixtures();
    let client = harness.connect_initialized().await;

    let pending = client
        .session()
        .send_request("custom/ask", None)
        .await
        .unwrap();
    client.session().close().await;

    assert!(matches!(pending.response().await, Err(McpError::SessionClosed)));
}

#[tokio::test]
async fn test_log_messages_respect_client_level() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    client
        .call(methods::LOGGING_SET_LEVEL, json!({"level": "warning"}))
        .await;

    let session = client.session().clone();
    session
        .log(LoggingLevel::Info, Some("e2e"), json!("too quiet"))
        .await
        .unwrap();
    session
        .log(LoggingLevel::Error, Some("e2e"), json!("disk full"))
        .await
        .unwrap();

    let notification = client.next_notification().await;
    assert_eq!(notification.method, methods::NOTIFICATION_MESSAGE);
    let params = notification.params.unwrap();
    assert_eq!(params["level"], "error");
    assert_eq!(params["logger"], "e2e");
    assert_eq!(params["data"], "disk full");
    assert!(client.pending_messages().is_empty());
}
