//! Discovery configuration.

use serde::{Deserialize, Serialize};

/// Settings for discovery providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Schemas to introspect.
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,

    /// Case-insensitive regular expressions; a column whose name matches any
    /// of them is reported as sensitive.
    #[serde(default = "default_sensitive_patterns")]
    pub sensitive_patterns: Vec<String>,

    /// Lists longer than this are truncated and the truncation is recorded
    /// as a limitation.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            schemas: default_schemas(),
            sensitive_patterns: default_sensitive_patterns(),
            max_items: default_max_items(),
        }
    }
}

fn default_schemas() -> Vec<String> {
    vec!["public".to_string()]
}

fn default_sensitive_patterns() -> Vec<String> {
    [
        r"e_?mail",
        r"(^|_)(first_|last_|full_|middle_|display_)?name$",
        r"phone|mobile",
        r"address|street|postal|zip_?code",
        r"passw(or)?d|secret|token|api_?key",
        r"ssn|social_security|tax_id|passport",
        r"birth|dob",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_items() -> usize {
    200
}
