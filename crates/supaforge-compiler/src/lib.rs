//! # supaforge-compiler
//!
//! Turns a [`DiscoverySnapshot`] into an ordered list of
//! [`ToolDescriptor`](supaforge_core::ToolDescriptor)s. Compilation is a pure function of the snapshot,
//! the requested categories and the compiler configuration: no I/O, no
//! clock, no randomness, so the same snapshot always compiles to the same
//! output.
//!
//! ## Safety rules
//!
//! - Descriptors reference only tables, columns, foreign keys and
//!   functions present in the snapshot.
//! - Relationships come from discovered foreign keys (including join
//!   tables whose two foreign keys were both discovered), never from
//!   naming patterns.
//! - Update and delete descriptors require a primary key and filter on it.
//! - Sensitive columns never enter a write descriptor unless the request
//!   carries an explicit override.
//! - Tables with RLS disabled yield descriptors that require the service
//!   role; with RLS enabled, caveats name the governing policies.
//!
//! ## Example
//!
//! ```ignore
//! use supaforge_compiler::{CompileRequest, compile};
//! use supaforge_core::{CompilerConfig, Operation};
//!
//! let request = CompileRequest::new([Operation::Select, Operation::Update]);
//! let output = compile(&snapshot, &CompilerConfig::default(), &request);
//! for skip in &output.skipped {
//!     println!("{} {}: {}", skip.operation, skip.resource, skip.reason);
//! }
//! ```

pub mod compiler;
pub mod filters;
pub mod naming;
pub mod priority;
pub mod relationships;
pub mod validate;

pub use compiler::{CompileOutput, CompileRequest, SkipKind, Skipped, ToolCompiler};
pub use validate::check_descriptor;

use supaforge_core::{CompilerConfig, DiscoverySnapshot};

/// Compile `snapshot` for `request` under `config`.
pub fn compile(
    snapshot: &DiscoverySnapshot,
    config: &CompilerConfig,
    request: &CompileRequest,
) -> CompileOutput {
    ToolCompiler::new(snapshot, config).compile(request)
}
