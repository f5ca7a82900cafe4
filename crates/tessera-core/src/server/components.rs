//! Server components
//!
//! A component pairs a descriptor (what clients see in list results) with
//! the handler that serves it. Handlers are trait objects so both plain
//! closures and stateful structs can be registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerResult;
use crate::protocol::messages::{Prompt, Resource, ResourceContents, ResourceTemplate, Tool};

// ============================================================================
// HANDLER TRAITS
// ============================================================================

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool; the returned text becomes the single content item
    async fn call(&self, arguments: Value) -> HandlerResult<String>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &str) -> HandlerResult<ResourceContents>;
}

#[async_trait]
pub trait ResourceTemplateHandler: Send + Sync {
    /// `variables` holds the values bound to each `{name}` of the template
    async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> HandlerResult<ResourceContents>;
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt text for the supplied arguments
    async fn render(&self, arguments: &HashMap<String, String>) -> HandlerResult<String>;
}

/// Adapts a synchronous closure to the handler traits
struct FnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> HandlerResult<String> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> HandlerResult<String> {
        (self.0)(arguments)
    }
}

#[async_trait]
impl<F> ResourceHandler for FnHandler<F>
where
    F: Fn(&str) -> HandlerResult<ResourceContents> + Send + Sync,
{
    async fn read(&self, uri: &str) -> HandlerResult<ResourceContents> {
        (self.0)(uri)
    }
}

#[async_trait]
impl<F> ResourceTemplateHandler for FnHandler<F>
where
    F: Fn(&str, &HashMap<String, String>) -> HandlerResult<ResourceContents> + Send + Sync,
{
    async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> HandlerResult<ResourceContents> {
        (self.0)(uri, variables)
    }
}

#[async_trait]
impl<F> PromptHandler for FnHandler<F>
where
    F: Fn(&HashMap<String, String>) -> HandlerResult<String> + Send + Sync,
{
    async fn render(&self, arguments: &HashMap<String, String>) -> HandlerResult<String> {
        (self.0)(arguments)
    }
}

// ============================================================================
// COMPONENTS
// ============================================================================

/// A callable tool
#[derive(Clone)]
pub struct ToolComponent {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

impl ToolComponent {
    pub fn new<F>(tool: Tool, handler: F) -> Self
    where
        F: Fn(Value) -> HandlerResult<String> + Send + Sync + 'static,
    {
        Self::with_handler(tool, FnHandler(handler))
    }

    pub fn with_handler(tool: Tool, handler: impl ToolHandler + 'static) -> Self {
        Self {
            tool,
            handler: Arc::new(handler),
        }
    }

    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }

    pub async fn call(&self, arguments: Value) -> HandlerResult<String> {
        self.handler.call(arguments).await
    }
}

impl fmt::Debug for ToolComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolComponent")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

/// A resource readable at one fixed URI
#[derive(Clone)]
pub struct ResourceComponent {
    resource: Resource,
    handler: Arc<dyn ResourceHandler>,
}

impl ResourceComponent {
    pub fn new<F>(resource: Resource, handler: F) -> Self
    where
        F: Fn(&str) -> HandlerResult<ResourceContents> + Send + Sync + 'static,
    {
        Self::with_handler(resource, FnHandler(handler))
    }

    pub fn with_handler(resource: Resource, handler: impl ResourceHandler + 'static) -> Self {
        Self {
            resource,
            handler: Arc::new(handler),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn uri(&self) -> &str {
        &self.resource.uri
    }

    pub async fn read(&self, uri: &str) -> HandlerResult<ResourceContents> {
        self.handler.read(uri).await
    }
}

impl fmt::Debug for ResourceComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceComponent")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// A family of resources addressed by a URI template such as `file:///{path}`
#[derive(Clone)]
pub struct ResourceTemplateComponent {
    template: ResourceTemplate,
    handler: Arc<dyn ResourceTemplateHandler>,
}

impl ResourceTemplateComponent {
    pub fn new<F>(template: ResourceTemplate, handler: F) -> Self
    where
        F: Fn(&str, &HashMap<String, String>) -> HandlerResult<ResourceContents>
            + Send
            + Sync
            + 'static,
    {
        Self::with_handler(template, FnHandler(handler))
    }

    pub fn with_handler(
        template: ResourceTemplate,
        handler: impl ResourceTemplateHandler + 'static,
    ) -> Self {
        Self {
            template,
            handler: Arc::new(handler),
        }
    }

    pub fn template(&self) -> &ResourceTemplate {
        &self.template
    }

    pub fn uri_template(&self) -> &str {
        &self.template.uri_template
    }

    /// Variable bindings if `uri` is an instance of this template
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        match_uri_template(&self.template.uri_template, uri)
    }

    pub async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> HandlerResult<ResourceContents> {
        self.handler.read(uri, variables).await
    }
}

impl fmt::Debug for ResourceTemplateComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTemplateComponent")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// A named prompt
#[derive(Clone)]
pub struct PromptComponent {
    prompt: Prompt,
    handler: Arc<dyn PromptHandler>,
}

impl PromptComponent {
    pub fn new<F>(prompt: Prompt, handler: F) -> Self
    where
        F: Fn(&HashMap<String, String>) -> HandlerResult<String> + Send + Sync + 'static,
    {
        Self::with_handler(prompt, FnHandler(handler))
    }

    pub fn with_handler(prompt: Prompt, handler: impl PromptHandler + 'static) -> Self {
        Self {
            prompt,
            handler: Arc::new(handler),
        }
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn name(&self) -> &str {
        &self.prompt.name
    }

    pub async fn render(&self, arguments: &HashMap<String, String>) -> HandlerResult<String> {
        self.handler.render(arguments).await
    }
}

impl fmt::Debug for PromptComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptComponent")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// URI TEMPLATES
// ============================================================================

enum Piece<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn parse_template(template: &str) -> Option<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => {
                let end = rest.find('}')?;
                let name = &rest[1..end];
                if name.is_empty() {
                    return None;
                }
                pieces.push(Piece::Variable(name));
                rest = &rest[end + 1..];
            }
            Some(start) => {
                pieces.push(Piece::Literal(&rest[..start]));
                rest = &rest[start..];
            }
            None => {
                pieces.push(Piece::Literal(rest));
                rest = "";
            }
        }
    }
    Some(pieces)
}

/// Match `uri` against a simple `{var}` template.
///
/// Each variable binds a non-empty run of characters without `/`.
/// Adjacent variables are ambiguous and never match.
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let pieces = parse_template(template)?;
    let mut variables = HashMap::new();
    let mut rest = uri;

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(literal) => rest = rest.strip_prefix(literal)?,
            Piece::Variable(name) => {
                let end = match pieces.get(i + 1) {
                    Some(Piece::Literal(next)) => rest.find(next)?,
                    Some(Piece::Variable(_)) => return None,
                    None => rest.len(),
                };
                let value = &rest[..end];
                if value.is_empty() || value.contains('/') {
                    return None;
                }
                variables.insert(name.to_string(), value.to_string());
                rest = &rest[end..];
            }
        }
    }

    rest.is_empty().then_some(variables)
}
