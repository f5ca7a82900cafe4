//! Fixture Components
//!
//! Small but realistic components registered by the e2e harness:
//! - `calculator` tool with typed arguments and a division error
//! - `echo` tool that returns its arguments verbatim
//! - `docs://readme` resource and `weather://{city}/current` template
//! - `greeting` prompt with one required and one optional argument

use std::collections::HashMap;

use serde_json::{Value, json};
use tessera_core::prelude::*;
use tessera_core::protocol::messages::ServerCapabilities;

pub const README_URI: &str = "docs://readme";
pub const README_TEXT: &str = "# Tessera\nA server used in tests.";
pub const WEATHER_TEMPLATE: &str = "weather://{city}/current";

/// Every capability on, with list-changed and subscribe support
pub fn full_capabilities() -> ServerCapabilities {
    ServerCapabilities::builder()
        .tools(true)
        .resources(true, true)
        .prompts(true)
        .logging()
        .build()
}

pub fn server_config() -> ServerConfig {
    ServerConfig::builder("tessera-e2e", "0.1.0")
        .capabilities(full_capabilities())
        .instructions("Fixture server for end-to-end tests")
        .protocol_versions(["2024-10-07", "2024-11-05"])
        .build()
}

pub fn calculator() -> ToolComponent {
    let tool = Tool::builder("calculator")
        .description("Apply an arithmetic operation to two integers")
        .property("a", "integer", "Left operand", true)
        .property("b", "integer", "Right operand", true)
        .property("operation", "string", "add, subtract, multiply or divide", false)
        .build();

    ToolComponent::new(tool, |args: Value| {
        let a = operand(&args, "a")?;
        let b = operand(&args, "b")?;
        let result = match args["operation"].as_str().unwrap_or("add") {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" if b == 0 => return Err(HandlerError::application("Division by zero")),
            "divide" => a / b,
            other => {
                return Err(HandlerError::invalid_arguments(format!(
                    "Unknown operation: {}",
                    other
                )));
            }
        };
        Ok(result.to_string())
    })
}

fn operand(args: &Value, name: &str) -> HandlerResult<i64> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::invalid_arguments(format!("'{}' must be an integer", name)))
}

pub fn echo() -> ToolComponent {
    ToolComponent::new(
        Tool::builder("echo")
            .description("Return the arguments as JSON")
            .build(),
        |args: Value| Ok(args.to_string()),
    )
}

pub fn readme() -> ResourceComponent {
    ResourceComponent::new(
        Resource::new(README_URI, "README")
            .with_description("Project readme")
            .with_mime_type("text/markdown"),
        |uri: &str| {
            Ok(ResourceContents::text(
                uri,
                Some("text/markdown".to_string()),
                README_TEXT,
            ))
        },
    )
}

pub fn weather() -> ResourceTemplateComponent {
    ResourceTemplateComponent::new(
        ResourceTemplate::new(WEATHER_TEMPLATE, "Current weather")
            .with_mime_type("application/json"),
        |uri: &str, variables: &HashMap<String, String>| {
            let city = variables.get("city").map(String::as_str).unwrap_or_default();
            let report = json!({ "city": city, "conditions": "sunny", "celsius": 21 });
            Ok(ResourceContents::text(
                uri,
                Some("application/json".to_string()),
                report.to_string(),
            ))
        },
    )
}

pub fn greeting() -> PromptComponent {
    PromptComponent::new(
        Prompt::builder("greeting")
            .description("Greet someone by name")
            .argument("name", "Who to greet", true)
            .argument("style", "formal or casual", false)
            .build(),
        |arguments: &HashMap<String, String>| {
            let name = arguments.get("name").map(String::as_str).unwrap_or_default();
            Ok(match arguments.get("style").map(String::as_str) {
                Some("formal") => format!("Good day, {}.", name),
                _ => format!("Hi {}!", name),
            })
        },
    )
}

/// Register every fixture on a server
pub fn install(server: &Server) {
    server.add_tool(calculator());
    server.add_tool(echo());
    server.add_resource(readme());
    server.add_resource_template(weather());
    server.add_prompt(greeting());
}
