//! Error taxonomy shared by every supaforge stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// External collaborator that a stage depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    /// Read-only schema discovery.
    Discovery,
    /// SQL execution against the configuration store.
    Executor,
    /// Operator prompt.
    Prompt,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Discovery => "discovery",
            Collaborator::Executor => "executor",
            Collaborator::Prompt => "prompt",
        };
        f.write_str(name)
    }
}

/// Errors produced by the compiler-and-workflow core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForgeError {
    /// The discovery document violates a schema-model invariant.
    #[error("malformed discovery: {0}")]
    MalformedDiscovery(String),

    /// The compiler refused a descriptor that would break a safety rule.
    #[error("unsafe {operation} on {resource} rejected: {reason}")]
    UnsafeOperationRejected {
        resource: String,
        operation: String,
        reason: String,
    },

    /// A configuration insert was requested before table setup succeeded.
    #[error("provisioning blocked: {0}")]
    ProvisioningBlocked(String),

    /// A collaborator failed; `message` is the collaborator's own text.
    #[error("{collaborator} failed: {message}")]
    CollaboratorFailure {
        collaborator: Collaborator,
        message: String,
    },

    /// The workflow needs more operator input.
    #[error("input incomplete: missing {}", .0.join(", "))]
    InputIncomplete(Vec<String>),

    /// Cancellation arrived after provisioning was dispatched.
    #[error("cancellation refused: {0}")]
    CancellationRefused(String),
}

impl ForgeError {
    /// Build a collaborator failure carrying the original error text.
    pub fn collaborator(collaborator: Collaborator, message: impl Into<String>) -> Self {
        ForgeError::CollaboratorFailure {
            collaborator,
            message: message.into(),
        }
    }

    /// The text to surface to the operator. Collaborator failures yield their
    /// original message untouched.
    pub fn operator_text(&self) -> String {
        match self {
            ForgeError::CollaboratorFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
