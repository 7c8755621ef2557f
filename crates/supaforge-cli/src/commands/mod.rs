//! Subcommand implementations.

pub mod compile;
pub mod discover;
pub mod run;
pub mod sql;
