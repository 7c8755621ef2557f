//! Tool compiler configuration.

use crate::tool::Operation;
use serde::{Deserialize, Serialize};

/// Limits and defaults applied when compiling tool descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Maximum number of descriptors in one compilation.
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,

    /// Page size placed on read descriptors.
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Allow sensitive columns in write descriptors. Off unless an operator
    /// explicitly acknowledges the risk.
    #[serde(default)]
    pub allow_sensitive_writes: bool,

    /// Categories used when the operator declines to choose.
    #[serde(default = "default_categories")]
    pub default_categories: Vec<Operation>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_tools: default_max_tools(),
            default_limit: default_limit(),
            allow_sensitive_writes: false,
            default_categories: default_categories(),
        }
    }
}

fn default_max_tools() -> usize {
    100
}

fn default_limit() -> u32 {
    50
}

fn default_categories() -> Vec<Operation> {
    vec![Operation::Select]
}
