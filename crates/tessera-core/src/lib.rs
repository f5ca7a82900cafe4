//! # Tessera Core
//!
//! Transport-agnostic engine of a Model Context Protocol server:
//!
//! - **Protocol**: JSON-RPC 2.0 message model and MCP payload records
//! - **Session**: per-connection handshake state machine and request routing
//! - **Server**: tool/resource/prompt registry behind a capability-gated route table
//! - **Transport**: traits concrete transports implement, plus an in-memory one
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_core::prelude::*;
//!
//! let provider = Arc::new(MemoryTransportProvider::new());
//! let config = ServerConfig::builder("demo", "0.1.0")
//!     .capabilities(ServerCapabilities::builder().tools(true).build())
//!     .build();
//! let server = McpServer::new(config, provider.clone())?;
//!
//! server
//!     .add_tool(ToolComponent::new(Tool::builder("echo").build(), |args| {
//!         Ok(args.to_string())
//!     }))
//!     .await;
//!
//! let mut client = provider.connect()?;
//! ```

pub mod error;
pub mod memory;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{
    HandlerError, HandlerResult, McpError, McpResult, ParseError, TransportError,
    TransportResult,
};
pub use memory::{ClientConnection, MemoryTransport, MemoryTransportProvider};
pub use protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
pub use server::{McpServer, Server, ServerConfig};
pub use session::{PendingRequest, Session, SessionState};
pub use transport::{SessionFactory, SessionRegistry, Transport, TransportProvider};

/// Common imports for building a server
pub mod prelude {
    pub use crate::error::{HandlerError, HandlerResult, McpError, McpResult};
    pub use crate::memory::{ClientConnection, MemoryTransportProvider};
    pub use crate::protocol::messages::{
        Content, Prompt, Resource, ResourceContents, ResourceTemplate, ServerCapabilities, Tool,
    };
    pub use crate::protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
    pub use crate::server::{
        McpServer, PromptComponent, ResourceComponent, ResourceTemplateComponent, Server,
        ServerConfig, ToolComponent,
    };
    pub use crate::session::{Session, SessionState};
    pub use crate::transport::{Transport, TransportProvider};
}
