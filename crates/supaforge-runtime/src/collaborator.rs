//! Narrow interfaces to everything outside the core.
//!
//! The coordinator is generic over these traits; adapters live in other
//! crates (`supaforge-adapter-pg`, the CLI prompts) and tests use
//! in-memory fakes.

use crate::session::{Confirmation, InputAnswer, InputField, Review};
use async_trait::async_trait;
use supaforge_core::DiscoveryDocument;
use supaforge_provision::{ProvisionState, StatementSet};

/// Read-only schema discovery.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Capture the project's discoverable capabilities. Partial failures
    /// belong in the document's `limitations`; an `Err` means nothing
    /// usable was produced.
    async fn discover(&self, project_ref: &str) -> anyhow::Result<DiscoveryDocument>;
}

/// What an executor reports after running a statement set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub statements_run: usize,
    pub message: String,
}

/// Runs planned statements against the configuration store.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run `set` in order, inside one transaction when
    /// `set.transactional`. Stops at the first failing statement; the
    /// error text is shown to the operator as-is.
    async fn execute(&self, set: &StatementSet) -> anyhow::Result<ExecutionReport>;

    /// Provisioning objects already present on the target. Executors that
    /// cannot look return a fresh state.
    async fn provisioned_objects(&self) -> anyhow::Result<ProvisionState> {
        Ok(ProvisionState::fresh())
    }
}

/// Typed suspension points where the operator answers.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Ask for `fields`. Only called while collecting inputs.
    async fn ask_missing(&self, fields: &[InputField]) -> anyhow::Result<InputAnswer>;

    /// Present compiled tools for acceptance.
    async fn confirm(&self, review: &Review<'_>) -> anyhow::Result<Confirmation>;
}

/// Executor for sessions that never run SQL; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExecutor;

#[async_trait]
impl SqlExecutor for NoExecutor {
    async fn execute(&self, _set: &StatementSet) -> anyhow::Result<ExecutionReport> {
        Err(anyhow::anyhow!("no SQL executor configured for this session"))
    }
}
