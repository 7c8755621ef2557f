//! Workflow coordinator configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Retry a failed discovery or execution call once before giving up.
    /// The retry is always reported in the output notes.
    #[serde(default = "default_true")]
    pub retry_collaborator_once: bool,

    /// How many times the operator is asked for missing required inputs.
    #[serde(default = "default_max_prompt_rounds")]
    pub max_prompt_rounds: u32,

    /// How many times the operator may ask for recompilation before the
    /// session is aborted.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            retry_collaborator_once: true,
            max_prompt_rounds: default_max_prompt_rounds(),
            max_regenerations: default_max_regenerations(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_prompt_rounds() -> u32 {
    3
}

fn default_max_regenerations() -> u32 {
    5
}
