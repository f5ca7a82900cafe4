//! Tool tests
//!
//! Listing, calling and live registration of tools through a session.

use serde_json::{Value, json};
use tessera_core::prelude::*;
use tessera_core::protocol::methods;
use tessera_e2e_tests::TestHarness;

#[tokio::test]
async fn test_tools_list_is_sorted_with_schemas() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let result = client.call(methods::TOOLS_LIST, json!({})).await;
    let tools = result["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();

    assert_eq!(names, vec!["calculator", "echo"]);

    let schema = &tools[0]["inputSchema"];
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["a"]["type"], "integer");
    assert_eq!(schema["required"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_calculator_operations() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    for (operation, expected) in [("add", "12"), ("subtract", "8"), ("multiply", "20"), ("divide", "5")] {
        let result = client
            .call(
                methods::TOOLS_CALL,
                json!({"name": "calculator", "arguments": {"a": 10, "b": 2, "operation": operation}}),
            )
            .await;

        assert_eq!(result["isError"], false, "{}", operation);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], expected, "{}", operation);
    }
}

#[tokio::test]
async fn test_handler_errors_map_to_error_codes() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let code = client
        .error_code(
            methods::TOOLS_CALL,
            json!({"name": "calculator", "arguments": {"a": 1, "b": 0, "operation": "divide"}}),
        )
        .await;
    assert_eq!(code, 500);

    let code = client
        .error_code(
            methods::TOOLS_CALL,
            json!({"name": "calculator", "arguments": {"a": "one", "b": 2}}),
        )
        .await;
    assert_eq!(code, -32602);
}

#[tokio::test]
async fn test_unknown_tool_is_a_soft_failure() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let result = client
        .call(methods::TOOLS_CALL, json!({"name": "teleport", "arguments": {}}))
        .await;

    assert_eq!(result, json!({"content": [], "isError": true}));
}

#[tokio::test]
async fn test_missing_arguments_default_to_empty_object() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let result = client.call(methods::TOOLS_CALL, json!({"name": "echo"})).await;

    assert_eq!(result["content"][0]["text"], "{}");
}

#[tokio::test]
async fn test_call_without_name_is_invalid_params() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    assert_eq!(
        client.error_code(methods::TOOLS_CALL, json!({"arguments": {}})).await,
        -32602
    );
}

#[tokio::test]
async fn test_live_registration_notifies_and_serves() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    harness
        .server
        .add_tool(ToolComponent::new(
            Tool::builder("shout")
                .property("text", "string", "What to shout", true)
                .build(),
            |args: Value| Ok(args["text"].as_str().unwrap_or_default().to_uppercase()),
        ))
        .await;

    let notification = client.next_notification().await;
    assert_eq!(notification.method, methods::NOTIFICATION_TOOLS_LIST_CHANGED);

    let result = client
        .call(methods::TOOLS_CALL, json!({"name": "shout", "arguments": {"text": "hey"}}))
        .await;
    assert_eq!(result["content"][0]["text"], "HEY");

    assert!(harness.server.remove_tool("shout").await);
    let notification = client.next_notification().await;
    assert_eq!(notification.method, methods::NOTIFICATION_TOOLS_LIST_CHANGED);
    assert!(!harness.server.remove_tool("shout").await);
}

#[tokio::test]
async fn test_registering_same_name_replaces_tool() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    harness.server.server().add_tool(ToolComponent::new(
        Tool::builder("echo").build(),
        |_: Value| Ok("replaced".to_string()),
    ));

    let tools = client.call(methods::TOOLS_LIST, json!({})).await;
    assert_eq!(tools["tools"].as_array().unwrap().len(), 2);

    let result = client.call(methods::TOOLS_CALL, json!({"name": "echo"})).await;
    assert_eq!(result["content"][0]["text"], "replaced");

    // Registry-level changes never broadcast
    assert!(client.pending_messages().is_empty());
}
