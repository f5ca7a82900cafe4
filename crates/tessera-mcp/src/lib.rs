//! Tessera MCP - transports and process wiring for Tessera servers
//!
//! Embed a [`tessera_core::McpServer`] behind newline-delimited stdio or
//! HTTP with Server-Sent Events.

pub mod config;
pub mod logging;
pub mod protocol;

#[cfg(feature = "http")]
pub use protocol::http::{HttpTransportConfig, HttpTransportProvider};
pub use protocol::stdio::StdioTransportProvider;
