//! # supaforge-provision
//!
//! Plans the SQL that creates and versions the administrative
//! configuration store. Planning is pure: functions here return typed
//! [`StatementSet`]s and never talk to a database. Execution belongs to an
//! executor collaborator.
//!
//! ## Guarantees
//!
//! - Every statement targets the one fixed relation
//!   (`public.tool_configurations`); callers cannot name another.
//! - The setup plan only contains objects missing from the observed
//!   [`ProvisionState`], and each statement is `IF NOT EXISTS`-guarded,
//!   so re-planning after a successful run yields an empty set.
//! - The versioned insert is a single transactional unit (advisory lock,
//!   deactivate, insert next version) and is only planned against a
//!   [`SetupOutcome`] that verified the store exists.

pub mod insert;
pub mod setup;
pub mod statement;
pub mod target;

pub use insert::{SetupOutcome, VersionedInsert, plan_versioned_insert};
pub use setup::{ProvisionState, plan_setup, setup_notes};
pub use statement::{SqlParam, Statement, StatementKind, StatementSet};
pub use target::ConfigTarget;
