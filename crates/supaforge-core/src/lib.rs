//! # supaforge-core
//!
//! Shared types for supaforge: the discovery snapshot (schema model), the
//! tool descriptor wire contract, configuration-store rows, the error
//! taxonomy and YAML configuration.
//!
//! This crate performs no I/O besides reading configuration files.

pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod tool;

pub use config::{
    CompilerConfig, ConfigError, DiscoveryConfig, ForgeConfig, McpClientConfig, WorkflowConfig,
};
pub use error::{Collaborator, ForgeError};
pub use snapshot::{
    Column, ColumnDocument, DbFunction, DiscoveryDocument, DiscoverySnapshot, EdgeFunction,
    Extension, ForeignKey, FunctionArg, Limitation, Policy, PolicyCommand, QualifiedName, Table,
    TableDocument, UniqueIndex,
};
pub use store::{CONFIG_SCHEMA, CONFIG_TABLE, ConfigurationRow};
pub use tool::{
    Filter, FilterOp, InputParam, NullsOrder, Operation, OrderSpec, Pagination, Relationship,
    ResourceRef, ToolDescriptor, ToolsDocument,
};
