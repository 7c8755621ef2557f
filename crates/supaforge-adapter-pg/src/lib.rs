//! Postgres adapters for supaforge.
//!
//! - [`PgDiscovery`] reads catalog metadata and never writes.
//! - [`PgConfigStore`] executes provisioning statements; the only relation
//!   it is handed statements for is the configuration table.
//! - [`JsonFileDiscovery`] replays a captured discovery document.

pub mod executor;
pub mod file;
pub mod introspect;
pub mod sensitive;

pub use executor::PgConfigStore;
pub use file::JsonFileDiscovery;
pub use introspect::PgDiscovery;
pub use sensitive::SensitiveClassifier;
