//! Rows of the administrative configuration store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the single relation supaforge is allowed to create or modify.
pub const CONFIG_TABLE: &str = "tool_configurations";

/// Schema that holds [`CONFIG_TABLE`].
pub const CONFIG_SCHEMA: &str = "public";

/// One stored, versioned tool configuration.
///
/// At most one row per `email` has `is_active = true`; versions per email
/// only ever increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRow {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub version: i32,
    /// Serialized `{"tools": [...]}` payload.
    pub tools: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
