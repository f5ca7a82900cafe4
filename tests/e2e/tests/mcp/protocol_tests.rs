//! Protocol lifecycle tests
//!
//! Handshake, version negotiation, pre-initialization rules and error codes
//! as seen by a client.

use serde_json::json;
use tessera_core::prelude::*;
use tessera_core::protocol::methods;
use tessera_e2e_tests::TestHarness;

#[tokio::test]
async fn test_handshake_reports_server_identity() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect();

    let result = client.initialize().await;

    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "tessera-e2e");
    assert_eq!(result["instructions"], "Fixture server for end-to-end tests");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
    assert_eq!(result["capabilities"]["resources"]["subscribe"], true);
    assert!(result["capabilities"]["logging"].is_object());

    let session = client.session();
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.client_info().unwrap().name, "e2e-client");
    assert_eq!(session.protocol_version().as_deref(), Some("2024-11-05"));
}

#[tokio::test]
async fn test_older_supported_version_is_echoed() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect();

    let result = client.initialize_with("2024-10-07", json!({})).await;

    assert_eq!(result["protocolVersion"], "2024-10-07");
}

#[tokio::test]
async fn test_unknown_version_falls_back_to_latest_supported() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect();

    let result = client.initialize_with("1999-01-01", json!({})).await;

    assert_eq!(result["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_requests_before_initialize_are_rejected() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect();

    assert_eq!(client.error_code(methods::TOOLS_LIST, json!({})).await, -32600);
    assert_eq!(client.session().state(), SessionState::Uninitialized);

    // ping is allowed at any time
    assert_eq!(client.call(methods::PING, json!({})).await, json!({}));
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let code = client
        .error_code(
            methods::INITIALIZE,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "again", "version": "2"}
            }),
        )
        .await;

    assert_eq!(code, -32600);
    assert_eq!(client.session().state(), SessionState::Initialized);
    assert_eq!(client.session().client_info().unwrap().name, "e2e-client");
}

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    assert_eq!(client.error_code("tools/explode", json!({})).await, -32601);
}

#[tokio::test]
async fn test_disabled_capability_hides_its_methods() {
    let config = ServerConfig::builder("tools-only", "1.0.0")
        .capabilities(ServerCapabilities::builder().tools(false).build())
        .build();
    let harness = TestHarness::new(config);
    let mut client = harness.connect_initialized().await;

    assert!(client.call(methods::TOOLS_LIST, json!({})).await["tools"].is_array());
    assert_eq!(client.error_code(methods::RESOURCES_LIST, json!({})).await, -32601);
    assert_eq!(client.error_code(methods::PROMPTS_LIST, json!({})).await, -32601);
    assert_eq!(
        client
            .error_code(methods::LOGGING_SET_LEVEL, json!({"level": "info"}))
            .await,
        -32601
    );
}

#[tokio::test]
async fn test_set_level_validates_and_records() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    client
        .call(methods::LOGGING_SET_LEVEL, json!({"level": "warning"}))
        .await;
    assert_eq!(
        client
            .error_code(methods::LOGGING_SET_LEVEL, json!({"level": "loud"}))
            .await,
        -32602
    );
}

#[tokio::test]
async fn test_cancelled_notification_closes_session() {
    let harness = TestHarness::with_fixtures();
    let client = harness.connect_initialized().await;
    let session_id = client.session().id().to_string();

    client
        .notify(
            methods::NOTIFICATION_CANCELLED,
            Some(json!({"requestId": 7, "reason": "user aborted"})),
        )
        .await;

    assert!(client.session().is_closed());
    assert_eq!(client.session().state(), SessionState::Closed);
    assert!(harness.provider.session(&session_id).is_none());
}
