//! # supaforge-runtime
//!
//! Sequences a session: collect inputs, discover, compile, confirm,
//! optionally provision, then assemble the output bundle.
//!
//! The [`Coordinator`] is generic over three collaborators:
//!
//! - [`DiscoveryProvider`]: read-only schema capture
//! - [`SqlExecutor`]: runs planned statements on the configuration store
//! - [`OperatorPrompt`]: typed questions to the operator
//!
//! Configuration is passed in at construction; nothing below the
//! coordinator reads the environment.

pub mod assembler;
pub mod collaborator;
pub mod control;
pub mod coordinator;
pub mod session;
pub mod state;

pub use assembler::{OutputBundle, SqlBlock, StageResults, ToolsBlock, assemble, mcp_config};
pub use collaborator::{DiscoveryProvider, ExecutionReport, NoExecutor, OperatorPrompt, SqlExecutor};
pub use control::CancelHandle;
pub use coordinator::{Coordinator, WorkflowOutcome};
pub use session::{
    Confirmation, InputAnswer, InputField, InputValues, ProvisionRequest, Review, SessionInputs,
};
pub use state::WorkflowState;
