//! Column-name heuristics for sensitive data.

use regex::{Regex, RegexBuilder};

/// Flags columns whose names match any configured pattern.
#[derive(Debug, Clone)]
pub struct SensitiveClassifier {
    patterns: Vec<Regex>,
}

impl SensitiveClassifier {
    /// Compile `patterns` case-insensitively.
    pub fn new(patterns: &[String]) -> anyhow::Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| anyhow::anyhow!("invalid sensitive pattern '{}': {}", p, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_sensitive(&self, column: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supaforge_core::DiscoveryConfig;

    fn classifier() -> SensitiveClassifier {
        SensitiveClassifier::new(&DiscoveryConfig::default().sensitive_patterns).unwrap()
    }

    #[test]
    fn test_default_patterns() {
        let c = classifier();
        for name in [
            "email",
            "contact_e_mail",
            "first_name",
            "name",
            "Phone_Number",
            "street_address",
            "password_hash",
            "api_key",
            "ssn",
            "date_of_birth",
        ] {
            assert!(c.is_sensitive(name), "{} should be sensitive", name);
        }
        for name in ["id", "total", "created_at", "status", "table_name_hint", "rename_count"] {
            assert!(!c.is_sensitive(name), "{} should not be sensitive", name);
        }
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = SensitiveClassifier::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }
}
