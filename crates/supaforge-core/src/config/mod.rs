//! Configuration types for supaforge.
//!
//! Configuration is loaded from a single YAML file (conventionally
//! `supaforge.yaml`). Every section and field has a default, so an empty
//! file yields a working configuration.
//!
//! Credentials are deliberately absent: connection strings and keys are
//! supplied by the caller (CLI flags or environment) and passed to the
//! adapters that need them.

pub mod compiler;
pub mod discovery;
pub mod mcp_client;
pub mod workflow;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use compiler::CompilerConfig;
pub use discovery::DiscoveryConfig;
pub use mcp_client::McpClientConfig;
pub use workflow::WorkflowConfig;

/// Complete supaforge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Default project label.
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub mcp_client: McpClientConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ForgeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values no workflow can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compiler.max_tools == 0 {
            return Err(ConfigError::Config(
                "compiler.max_tools must be at least 1".to_string(),
            ));
        }
        if self.compiler.default_limit == 0 {
            return Err(ConfigError::Config(
                "compiler.default_limit must be at least 1".to_string(),
            ));
        }
        if self.workflow.max_prompt_rounds == 0 {
            return Err(ConfigError::Config(
                "workflow.max_prompt_rounds must be at least 1".to_string(),
            ));
        }
        if self.mcp_client.server_name.trim().is_empty() {
            return Err(ConfigError::Config(
                "mcp_client.server_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Operation;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ForgeConfig::from_yaml("").unwrap();
        assert_eq!(config.compiler.max_tools, 100);
        assert_eq!(config.compiler.default_limit, 50);
        assert!(!config.compiler.allow_sensitive_writes);
        assert_eq!(config.compiler.default_categories, vec![Operation::Select]);
        assert!(config.workflow.retry_collaborator_once);
        assert_eq!(config.mcp_client.server_name, "supamcpbuilder");
        assert_eq!(config.discovery.schemas, vec!["public".to_string()]);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
project: shop
compiler:
  max_tools: 10
  default_categories: [select, rpc]
workflow:
  retry_collaborator_once: false
"#;
        let config = ForgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.project.as_deref(), Some("shop"));
        assert_eq!(config.compiler.max_tools, 10);
        assert_eq!(config.compiler.default_limit, 50);
        assert_eq!(
            config.compiler.default_categories,
            vec![Operation::Select, Operation::Rpc]
        );
        assert!(!config.workflow.retry_collaborator_once);
        assert_eq!(config.workflow.max_prompt_rounds, 3);
        assert_eq!(config.workflow.max_regenerations, 5);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let err = ForgeConfig::from_yaml("compiler:\n  max_tools: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mcp_client:\n  server_name: acme-tools").unwrap();
        let config = ForgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.mcp_client.server_name, "acme-tools");
        assert_eq!(config.mcp_client.command, "npx");
    }
}
