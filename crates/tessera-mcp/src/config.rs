//! Command-line configuration
//!
//! Every flag can also be set from the environment, so the server can be
//! launched unchanged by MCP hosts that only pass env vars.

use clap::{Parser, ValueEnum};

use tessera_core::ServerConfig;
use tessera_core::protocol::messages::ServerCapabilities;

#[cfg(feature = "http")]
use crate::protocol::http::HttpTransportConfig;

/// Which transport the server speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout
    Stdio,
    /// Server-Sent Events plus POSTed messages
    Http,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Tessera - Model Context Protocol server
#[derive(Debug, Parser)]
#[command(name = "tessera-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Model Context Protocol server over stdio or HTTP+SSE")]
pub struct Cli {
    /// Transport to serve on
    #[arg(long, value_enum, env = "TESSERA_TRANSPORT", default_value = "stdio")]
    pub transport: TransportKind,

    /// Address to bind in http mode
    #[arg(long, env = "TESSERA_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind in http mode
    #[arg(long, env = "TESSERA_PORT", default_value_t = 3100)]
    pub port: u16,

    /// Path of the event stream endpoint
    #[arg(long, env = "TESSERA_SSE_PATH", default_value = "/sse")]
    pub sse_path: String,

    /// Path clients POST their messages to
    #[arg(long, env = "TESSERA_MESSAGE_PATH", default_value = "/message")]
    pub message_path: String,

    /// Server name reported during initialization
    #[arg(long, env = "TESSERA_SERVER_NAME", default_value = "tessera-mcp")]
    pub name: String,

    /// Usage instructions reported during initialization
    #[arg(long, env = "TESSERA_INSTRUCTIONS")]
    pub instructions: Option<String>,

    /// Log output format (logs always go to stderr)
    #[arg(long, value_enum, env = "TESSERA_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Cli {
    #[cfg(feature = "http")]
    pub fn http_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            host: self.host.clone(),
            port: self.port,
            sse_path: self.sse_path.clone(),
            message_path: self.message_path.clone(),
        }
    }

    /// Server identity, advertising every capability the binary supports
    pub fn server_config(&self) -> ServerConfig {
        let capabilities = ServerCapabilities::builder()
            .tools(true)
            .resources(true, true)
            .prompts(true)
            .logging()
            .build();

        let mut builder = ServerConfig::builder(&self.name, env!("CARGO_PKG_VERSION"))
            .capabilities(capabilities);
        if let Some(instructions) = &self.instructions {
            builder = builder.instructions(instructions);
        }
        builder.build()
    }
}
