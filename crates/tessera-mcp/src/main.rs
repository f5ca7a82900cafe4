//! Tessera MCP Server
//!
//! Serves the Model Context Protocol over stdio (default) or HTTP+SSE.
//!
//! ```text
//! tessera-mcp
//! tessera-mcp --transport http --port 3100
//! RUST_LOG=debug tessera-mcp --log-format json
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use tessera_core::McpServer;
use tessera_mcp::config::{Cli, TransportKind};
use tessera_mcp::{StdioTransportProvider, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse before logging so --help/--version print cleanly
    let cli = Cli::parse();
    logging::init(cli.log_format);

    info!("Tessera MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.transport {
        TransportKind::Stdio => serve_stdio(&cli).await,
        TransportKind::Http => serve_http(&cli).await,
    }
}

async fn serve_stdio(cli: &Cli) -> anyhow::Result<()> {
    let provider = Arc::new(StdioTransportProvider::stdio());
    let server = McpServer::new(cli.server_config(), provider.clone())
        .context("failed to start stdio transport")?;

    info!("Serving on stdio");
    provider.wait().await;
    server.close_gracefully().await;

    info!("Tessera MCP Server shutting down");
    Ok(())
}

#[cfg(feature = "http")]
async fn serve_http(cli: &Cli) -> anyhow::Result<()> {
    use tessera_mcp::HttpTransportProvider;

    let provider = Arc::new(HttpTransportProvider::new(cli.http_config()));
    let _server = McpServer::new(cli.server_config(), provider.clone())
        .context("failed to start http transport")?;

    provider
        .serve()
        .await
        .with_context(|| format!("http server on {}:{} failed", cli.host, cli.port))
}

#[cfg(not(feature = "http"))]
async fn serve_http(_cli: &Cli) -> anyhow::Result<()> {
    anyhow::bail!("built without the `http` feature")
}
