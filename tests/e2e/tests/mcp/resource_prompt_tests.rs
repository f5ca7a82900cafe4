//! Resource and prompt tests

use serde_json::json;
use tessera_core::prelude::*;
use tessera_core::protocol::methods;
use tessera_e2e_tests::{TestHarness, fixtures};

#[tokio::test]
async fn test_resources_and_templates_are_listed() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let resources = client.call(methods::RESOURCES_LIST, json!({})).await;
    assert_eq!(
        resources["resources"],
        json!([{
            "uri": fixtures::README_URI,
            "name": "README",
            "description": "Project readme",
            "mimeType": "text/markdown"
        }])
    );

    let templates = client.call(methods::RESOURCES_TEMPLATES_LIST, json!({})).await;
    assert_eq!(
        templates["resourceTemplates"][0]["uriTemplate"],
        fixtures::WEATHER_TEMPLATE
    );
}

#[tokio::test]
async fn test_read_exact_resource() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let result = client
        .call(methods::RESOURCES_READ, json!({"uri": fixtures::README_URI}))
        .await;

    assert_eq!(result["contents"][0]["uri"], fixtures::README_URI);
    assert_eq!(result["contents"][0]["text"], fixtures::README_TEXT);
}

#[tokio::test]
async fn test_read_through_template() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let result = client
        .call(methods::RESOURCES_READ, json!({"uri": "weather://lisbon/current"}))
        .await;

    let report: serde_json::Value =
        serde_json::from_str(result["contents"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(report["city"], "lisbon");
    assert_eq!(result["contents"][0]["uri"], "weather://lisbon/current");
}

#[tokio::test]
async fn test_unknown_resource_reads_empty() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    for uri in ["docs://missing", "weather:///current", "weather://a/b/current"] {
        let result = client.call(methods::RESOURCES_READ, json!({"uri": uri})).await;
        assert_eq!(result, json!({"contents": []}), "{}", uri);
    }
}

#[tokio::test]
async fn test_subscribers_receive_updates() {
    let harness = TestHarness::with_fixtures();
    let mut subscriber = harness.connect_initialized().await;
    let mut bystander = harness.connect_initialized().await;

    subscriber
        .call(methods::RESOURCES_SUBSCRIBE, json!({"uri": fixtures::README_URI}))
        .await;
    harness.server.notify_resource_updated(fixtures::README_URI).await;

    let notification = subscriber.next_notification().await;
    assert_eq!(notification.method, methods::NOTIFICATION_RESOURCES_UPDATED);
    assert_eq!(notification.params.unwrap()["uri"], fixtures::README_URI);
    assert!(bystander.pending_messages().is_empty());

    subscriber
        .call(methods::RESOURCES_UNSUBSCRIBE, json!({"uri": fixtures::README_URI}))
        .await;
    harness.server.notify_resource_updated(fixtures::README_URI).await;
    assert!(subscriber.pending_messages().is_empty());
}

#[tokio::test]
async fn test_resource_registration_broadcasts_list_changed() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    assert!(harness.server.remove_resource(fixtures::README_URI).await);

    let notification = client.next_notification().await;
    assert_eq!(notification.method, methods::NOTIFICATION_RESOURCES_LIST_CHANGED);
    let result = client
        .call(methods::RESOURCES_READ, json!({"uri": fixtures::README_URI}))
        .await;
    assert_eq!(result["contents"], json!([]));
}

#[tokio::test]
async fn test_prompt_listing_and_rendering() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    let prompts = client.call(methods::PROMPTS_LIST, json!({})).await;
    assert_eq!(prompts["prompts"][0]["name"], "greeting");
    assert_eq!(prompts["prompts"][0]["arguments"][0]["required"], true);

    let result = client
        .call(
            methods::PROMPTS_GET,
            json!({"name": "greeting", "arguments": {"name": "Ada", "style": "formal"}}),
        )
        .await;
    assert_eq!(result["description"], "Greet someone by name");
    assert_eq!(result["messages"][0]["role"], "user");
    assert_eq!(result["messages"][0]["content"]["text"], "Good day, Ada.");
}

#[tokio::test]
async fn test_prompt_errors_are_invalid_params() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    assert_eq!(
        client.error_code(methods::PROMPTS_GET, json!({"name": "farewell"})).await,
        -32602
    );
    assert_eq!(
        client
            .error_code(methods::PROMPTS_GET, json!({"name": "greeting", "arguments": {}}))
            .await,
        -32602
    );
}

#[tokio::test]
async fn test_prompt_replacement_broadcasts_list_changed() {
    let harness = TestHarness::with_fixtures();
    let mut client = harness.connect_initialized().await;

    harness
        .server
        .add_prompt(PromptComponent::new(
            Prompt::builder("greeting").build(),
            |_: &std::collections::HashMap<String, String>| Ok("Hello.".to_string()),
        ))
        .await;

    let notification = client.next_notification().await;
    assert_eq!(notification.method, methods::NOTIFICATION_PROMPTS_LIST_CHANGED);

    let result = client.call(methods::PROMPTS_GET, json!({"name": "greeting"})).await;
    assert_eq!(result["messages"][0]["content"]["text"], "Hello.");
}
