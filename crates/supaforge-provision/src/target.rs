//! The single relation provisioning may touch.

use supaforge_core::{CONFIG_SCHEMA, CONFIG_TABLE};

/// Handle on the configuration relation.
///
/// There is no constructor taking a name: the target is fixed at compile
/// time and every planned statement is built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigTarget {
    schema: &'static str,
    table: &'static str,
}

pub const INDEX_EMAIL: &str = "idx_tool_configurations_email";
pub const INDEX_IS_ACTIVE: &str = "idx_tool_configurations_is_active";
pub const INDEX_ACTIVE_PER_EMAIL: &str = "uq_tool_config_active_per_email";
pub const INDEX_EMAIL_VERSION: &str = "uq_tool_config_email_version";

pub const POLICY_SELECT_OWN_ACTIVE: &str = "select_own_active";
pub const POLICY_INSERT_OWN: &str = "insert_own";
pub const POLICY_UPDATE_OWN: &str = "update_own";
pub const POLICY_DEACTIVATE_OWN: &str = "deactivate_own";

/// Indexes in creation order.
pub const INDEXES: [&str; 4] = [
    INDEX_EMAIL,
    INDEX_IS_ACTIVE,
    INDEX_ACTIVE_PER_EMAIL,
    INDEX_EMAIL_VERSION,
];

/// Policies in creation order.
pub const POLICIES: [&str; 4] = [
    POLICY_SELECT_OWN_ACTIVE,
    POLICY_INSERT_OWN,
    POLICY_UPDATE_OWN,
    POLICY_DEACTIVATE_OWN,
];

impl ConfigTarget {
    pub const fn fixed() -> Self {
        Self {
            schema: CONFIG_SCHEMA,
            table: CONFIG_TABLE,
        }
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// `"public"."tool_configurations"`
    pub fn qualified_ident(&self) -> String {
        format!("{}.{}", quote_ident(self.schema), quote_ident(self.table))
    }

    /// `public.tool_configurations`, for notes and logs.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl Default for ConfigTarget {
    fn default() -> Self {
        Self::fixed()
    }
}

/// Double-quote an identifier that is known to be a plain word.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
