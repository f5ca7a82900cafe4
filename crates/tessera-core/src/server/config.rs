//! Server configuration

use crate::protocol::LATEST_PROTOCOL_VERSION;
use crate::protocol::messages::{Implementation, ServerCapabilities};

/// Identity, capabilities and supported versions of a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub info: Implementation,
    pub capabilities: ServerCapabilities,
    pub instructions: Option<String>,
    /// Oldest first; the last entry is the fallback during negotiation
    pub protocol_versions: Vec<String>,
}

impl ServerConfig {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig {
                info: Implementation::new(name, version),
                capabilities: ServerCapabilities::default(),
                instructions: None,
                protocol_versions: vec![LATEST_PROTOCOL_VERSION.to_string()],
            },
        }
    }
}

#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    /// Replace the supported versions. An empty list keeps the default.
    pub fn protocol_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let versions: Vec<String> = versions.into_iter().map(Into::into).collect();
        if !versions.is_empty() {
            self.config.protocol_versions = versions;
        }
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
