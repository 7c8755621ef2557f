//! Connection template for the downstream MCP server.
//!
//! Describes the `mcpServers` entry an end user pastes into their MCP
//! client to reach a project through the runtime server.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpClientConfig {
    /// Key under `mcpServers`.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Launcher command.
    #[serde(default = "default_command")]
    pub command: String,

    /// Package passed to the launcher.
    #[serde(default = "default_package")]
    pub package: String,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            command: default_command(),
            package: default_package(),
        }
    }
}

fn default_server_name() -> String {
    "supamcpbuilder".to_string()
}

fn default_command() -> String {
    "npx".to_string()
}

fn default_package() -> String {
    "supamcpbuilder".to_string()
}
