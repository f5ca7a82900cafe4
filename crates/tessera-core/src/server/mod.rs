//! MCP Server Core
//!
//! Component registry, the capability-gated route table and request
//! dispatch. [`McpServer`] binds a [`Server`] to a transport provider.

pub mod components;
pub mod config;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{McpError, McpResult};
use crate::protocol::messages::{
    CallToolRequest, CallToolResult, Content, GetPromptRequest, GetPromptResult,
    InitializeResult, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, PaginatedRequest, Prompt, PromptMessage, ReadResourceRequest,
    ReadResourceResult, Resource, ResourceTemplate, ResourceUpdatedNotification,
    ServerCapabilities, SetLevelRequest, SubscribeRequest, Tool, UnsubscribeRequest,
};
use crate::protocol::methods;
use crate::session::Session;
use crate::transport::{SessionFactory, Transport, TransportProvider};

pub use components::{
    PromptComponent, PromptHandler, ResourceComponent, ResourceHandler,
    ResourceTemplateComponent, ResourceTemplateHandler, ToolComponent, ToolHandler,
    match_uri_template,
};
pub use config::{ServerConfig, ServerConfigBuilder};

/// Operation a method name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    ResourceTemplatesList,
    ResourcesSubscribe,
    ResourcesUnsubscribe,
    PromptsList,
    PromptsGet,
    LoggingSetLevel,
}

/// Build the method table for a capability set. `ping` is always served.
fn build_routes(capabilities: &ServerCapabilities) -> HashMap<&'static str, Route> {
    let mut routes = HashMap::new();
    routes.insert(methods::PING, Route::Ping);

    if capabilities.tools.is_some() {
        routes.insert(methods::TOOLS_LIST, Route::ToolsList);
        routes.insert(methods::TOOLS_CALL, Route::ToolsCall);
    }

    if capabilities.resources.is_some() {
        routes.insert(methods::RESOURCES_LIST, Route::ResourcesList);
        routes.insert(methods::RESOURCES_READ, Route::ResourcesRead);
        routes.insert(methods::RESOURCES_TEMPLATES_LIST, Route::ResourceTemplatesList);

        if capabilities.resources_subscribe() {
            routes.insert(methods::RESOURCES_SUBSCRIBE, Route::ResourcesSubscribe);
            routes.insert(methods::RESOURCES_UNSUBSCRIBE, Route::ResourcesUnsubscribe);
        }
    }

    if capabilities.prompts.is_some() {
        routes.insert(methods::PROMPTS_LIST, Route::PromptsList);
        routes.insert(methods::PROMPTS_GET, Route::PromptsGet);
    }

    if capabilities.logging.is_some() {
        routes.insert(methods::LOGGING_SET_LEVEL, Route::LoggingSetLevel);
    }

    routes
}

/// Registry of tools, resources and prompts plus the route table
pub struct Server {
    config: ServerConfig,
    routes: HashMap<&'static str, Route>,
    tools: DashMap<String, ToolComponent>,
    resources: DashMap<String, ResourceComponent>,
    templates: DashMap<String, ResourceTemplateComponent>,
    prompts: DashMap<String, PromptComponent>,
    /// Resource URI -> subscribed sessions, keyed by session id
    subscriptions: DashMap<String, HashMap<String, Weak<Session>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let routes = build_routes(&config.capabilities);
        debug!(methods = routes.len(), "Route table built");
        Self {
            config,
            routes,
            tools: DashMap::new(),
            resources: DashMap::new(),
            templates: DashMap::new(),
            prompts: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    /// Factory creating a session bound to this server per connection
    pub fn session_factory(self: &Arc<Self>) -> Arc<dyn SessionFactory> {
        let server = Arc::clone(self);
        Arc::new(move |transport: Arc<dyn Transport>| {
            Session::new(transport, Arc::clone(&server))
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.config.capabilities
    }

    pub fn protocol_versions(&self) -> &[String] {
        &self.config.protocol_versions
    }

    pub fn initialize_result(&self, protocol_version: &str) -> InitializeResult {
        InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: self.config.capabilities.clone(),
            server_info: self.config.info.clone(),
            instructions: self.config.instructions.clone(),
        }
    }

    pub fn route(&self, method: &str) -> Option<Route> {
        self.routes.get(method).copied()
    }

    /// Served method names, sorted
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.routes.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    // ========================================================================
    // REGISTRY
    // ========================================================================

    /// Register a tool, replacing any tool with the same name
    pub fn add_tool(&self, tool: ToolComponent) {
        info!(tool = %tool.name(), "Tool registered");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn remove_tool(&self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn tools(&self) -> Vec<Tool> {
        sorted(self.tools.iter().map(|t| t.tool().clone()), |t| t.name.clone())
    }

    pub fn add_resource(&self, resource: ResourceComponent) {
        info!(uri = %resource.uri(), "Resource registered");
        self.resources.insert(resource.uri().to_string(), resource);
    }

    pub fn remove_resource(&self, uri: &str) -> bool {
        self.resources.remove(uri).is_some()
    }

    pub fn resources(&self) -> Vec<Resource> {
        sorted(self.resources.iter().map(|r| r.resource().clone()), |r| r.uri.clone())
    }

    pub fn add_resource_template(&self, template: ResourceTemplateComponent) {
        info!(uri_template = %template.uri_template(), "Resource template registered");
        self.templates
            .insert(template.uri_template().to_string(), template);
    }

    pub fn remove_resource_template(&self, uri_template: &str) -> bool {
        self.templates.remove(uri_template).is_some()
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        sorted(
            self.templates.iter().map(|t| t.template().clone()),
            |t| t.uri_template.clone(),
        )
    }

    pub fn add_prompt(&self, prompt: PromptComponent) {
        info!(prompt = %prompt.name(), "Prompt registered");
        self.prompts.insert(prompt.name().to_string(), prompt);
    }

    pub fn remove_prompt(&self, name: &str) -> bool {
        self.prompts.remove(name).is_some()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        sorted(self.prompts.iter().map(|p| p.prompt().clone()), |p| p.name.clone())
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe(&self, uri: &str, session: &Session) {
        debug!(session_id = %session.id(), uri, "Resource subscribed");
        self.subscriptions
            .entry(uri.to_string())
            .or_default()
            .insert(session.id().to_string(), session.downgrade());
    }

    pub fn unsubscribe(&self, uri: &str, session_id: &str) {
        self.subscriptions.remove_if_mut(uri, |_, subscribers| {
            subscribers.remove(session_id);
            subscribers.is_empty()
        });
    }

    /// Live sessions subscribed to `uri`
    pub fn subscribers(&self, uri: &str) -> Vec<Arc<Session>> {
        self.subscriptions
            .get(uri)
            .map(|subs| subs.values().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Drop every subscription held by a closing session
    pub(crate) fn forget_session(&self, session_id: &str) {
        self.subscriptions.retain(|_, subscribers| {
            subscribers.remove(session_id);
            !subscribers.is_empty()
        });
    }

    /// Subscribers of `uri` that can still receive, dropping the rest
    fn prune_subscribers(&self, uri: &str) -> Vec<Arc<Session>> {
        let mut live = Vec::new();
        self.subscriptions.remove_if_mut(uri, |_, subscribers| {
            subscribers.retain(|session_id, weak| match weak.upgrade() {
                Some(session) if !session.is_closed() && !session.transport().is_closed() => {
                    live.push(session);
                    true
                }
                _ => {
                    debug!(session_id = %session_id, uri, "Pruned dead subscriber");
                    false
                }
            });
            subscribers.is_empty()
        });
        live
    }

    /// Tell subscribers of `uri` that its contents changed
    pub async fn notify_resource_updated(&self, uri: &str) {
        let params = serde_json::to_value(ResourceUpdatedNotification {
            uri: uri.to_string(),
        })
        .ok();
        for session in self.prune_subscribers(uri) {
            if let Err(e) = session
                .send_notification(methods::NOTIFICATION_RESOURCES_UPDATED, params.clone())
                .await
            {
                warn!(session_id = %session.id(), uri, "Failed to send resource update: {}", e);
            }
        }
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Run the operation behind `route` for a request from `session`
    pub async fn dispatch(
        &self,
        route: Route,
        params: Option<Value>,
        session: &Session,
    ) -> McpResult<Value> {
        let transport = session.transport();
        match route {
            Route::Ping => Ok(json!({})),
            Route::ToolsList => {
                let _: PaginatedRequest = transport.unmarshal(params)?;
                to_value(ListToolsResult {
                    tools: self.tools(),
                    next_cursor: None,
                })
            }
            Route::ToolsCall => to_value(self.call_tool(transport.unmarshal(params)?).await?),
            Route::ResourcesList => {
                let _: PaginatedRequest = transport.unmarshal(params)?;
                to_value(ListResourcesResult {
                    resources: self.resources(),
                    next_cursor: None,
                })
            }
            Route::ResourcesRead => {
                let request: ReadResourceRequest = transport.unmarshal(params)?;
                to_value(self.read_resource(&request.uri).await?)
            }
            Route::ResourceTemplatesList => {
                let _: PaginatedRequest = transport.unmarshal(params)?;
                to_value(ListResourceTemplatesResult {
                    resource_templates: self.resource_templates(),
                    next_cursor: None,
                })
            }
            Route::ResourcesSubscribe => {
                let request: SubscribeRequest = transport.unmarshal(params)?;
                self.subscribe(&request.uri, session);
                Ok(json!({}))
            }
            Route::ResourcesUnsubscribe => {
                let request: UnsubscribeRequest = transport.unmarshal(params)?;
                self.unsubscribe(&request.uri, session.id());
                Ok(json!({}))
            }
            Route::PromptsList => {
                let _: PaginatedRequest = transport.unmarshal(params)?;
                to_value(ListPromptsResult {
                    prompts: self.prompts(),
                    next_cursor: None,
                })
            }
            Route::PromptsGet => to_value(self.get_prompt(transport.unmarshal(params)?).await?),
            Route::LoggingSetLevel => {
                let request: SetLevelRequest = transport.unmarshal(params)?;
                session.set_log_level(request.level);
                Ok(json!({}))
            }
        }
    }

    /// Invoke a tool. An unknown name is a soft failure, not an error.
    pub async fn call_tool(&self, request: CallToolRequest) -> McpResult<CallToolResult> {
        let Some(tool) = self.tools.get(&request.name).map(|t| t.clone()) else {
            warn!(tool = %request.name, "Unknown tool");
            return Ok(CallToolResult::failure());
        };

        let arguments = request.arguments.unwrap_or_else(|| json!({}));
        let text = tool.call(arguments).await?;
        Ok(CallToolResult::text(text))
    }

    /// Read a resource by exact URI, falling back to the first matching template.
    /// Unknown URIs yield empty contents.
    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        if let Some(resource) = self.resources.get(uri).map(|r| r.clone()) {
            let contents = resource.read(uri).await?;
            return Ok(ReadResourceResult {
                contents: vec![contents],
            });
        }

        let mut templates: Vec<ResourceTemplateComponent> =
            self.templates.iter().map(|t| t.clone()).collect();
        templates.sort_by(|a, b| a.uri_template().cmp(b.uri_template()));

        for template in templates {
            if let Some(variables) = template.matches(uri) {
                let contents = template.read(uri, &variables).await?;
                return Ok(ReadResourceResult {
                    contents: vec![contents],
                });
            }
        }

        debug!(uri, "Unknown resource");
        Ok(ReadResourceResult {
            contents: Vec::new(),
        })
    }

    /// Render a prompt after checking its required arguments
    pub async fn get_prompt(&self, request: GetPromptRequest) -> McpResult<GetPromptResult> {
        let Some(prompt) = self.prompts.get(&request.name).map(|p| p.clone()) else {
            return Err(McpError::InvalidParams(format!(
                "Unknown prompt: {}",
                request.name
            )));
        };

        if let Some(missing) = prompt
            .prompt()
            .required_arguments()
            .find(|name| !request.arguments.contains_key(*name))
        {
            return Err(McpError::InvalidParams(format!(
                "Missing required argument: {}",
                missing
            )));
        }

        let text = prompt.render(&request.arguments).await?;
        Ok(GetPromptResult {
            description: prompt.prompt().description.clone(),
            messages: vec![PromptMessage::user(Content::text(text))],
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("info", &self.config.info)
            .field("methods", &self.methods())
            .field("tools", &self.tools.len())
            .field("resources", &self.resources.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

fn to_value<T: Serialize>(value: T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::Internal(e.to_string()))
}

fn sorted<T, K: Ord>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(key);
    items
}

// ============================================================================
// FACADE
// ============================================================================

/// A [`Server`] bound to a transport provider.
///
/// Registry changes made through the facade broadcast the matching
/// `list_changed` notification when the capability asks for it.
pub struct McpServer {
    server: Arc<Server>,
    provider: Arc<dyn TransportProvider>,
}

impl McpServer {
    pub fn new(config: ServerConfig, provider: Arc<dyn TransportProvider>) -> McpResult<Self> {
        let server = Arc::new(Server::new(config));
        provider.set_session_factory(server.session_factory())?;
        info!(
            name = %server.config().info.name,
            version = %server.config().info.version,
            "MCP server bound to transport"
        );
        Ok(Self { server, provider })
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub async fn add_tool(&self, tool: ToolComponent) {
        self.server.add_tool(tool);
        self.tools_changed().await;
    }

    pub async fn remove_tool(&self, name: &str) -> bool {
        let removed = self.server.remove_tool(name);
        if removed {
            self.tools_changed().await;
        }
        removed
    }

    pub async fn add_resource(&self, resource: ResourceComponent) {
        self.server.add_resource(resource);
        self.resources_changed().await;
    }

    pub async fn remove_resource(&self, uri: &str) -> bool {
        let removed = self.server.remove_resource(uri);
        if removed {
            self.resources_changed().await;
        }
        removed
    }

    pub async fn add_resource_template(&self, template: ResourceTemplateComponent) {
        self.server.add_resource_template(template);
        self.resources_changed().await;
    }

    pub async fn remove_resource_template(&self, uri_template: &str) -> bool {
        let removed = self.server.remove_resource_template(uri_template);
        if removed {
            self.resources_changed().await;
        }
        removed
    }

    pub async fn add_prompt(&self, prompt: PromptComponent) {
        self.server.add_prompt(prompt);
        self.prompts_changed().await;
    }

    pub async fn remove_prompt(&self, name: &str) -> bool {
        let removed = self.server.remove_prompt(name);
        if removed {
            self.prompts_changed().await;
        }
        removed
    }

    pub async fn notify_resource_updated(&self, uri: &str) {
        self.server.notify_resource_updated(uri).await;
    }

    pub async fn notify_clients(&self, method: &str, params: Option<Value>) {
        self.provider.notify_clients(method, params).await;
    }

    pub async fn close_gracefully(&self) {
        info!("MCP server closing gracefully");
        self.provider.close_gracefully().await;
    }

    pub async fn close(&self) {
        info!("MCP server closing");
        self.provider.close().await;
    }

    async fn tools_changed(&self) {
        if self.server.capabilities().tools_list_changed() {
            self.notify_clients(methods::NOTIFICATION_TOOLS_LIST_CHANGED, None)
                .await;
        }
    }

    async fn resources_changed(&self) {
        if self.server.capabilities().resources_list_changed() {
            self.notify_clients(methods::NOTIFICATION_RESOURCES_LIST_CHANGED, None)
                .await;
        }
    }

    async fn prompts_changed(&self) {
        if self.server.capabilities().prompts_list_changed() {
            self.notify_clients(methods::NOTIFICATION_PROMPTS_LIST_CHANGED, None)
                .await;
        }
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
