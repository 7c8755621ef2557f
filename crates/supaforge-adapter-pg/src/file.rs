//! Discovery from a previously captured JSON document.

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use supaforge_core::DiscoveryDocument;
use supaforge_runtime::DiscoveryProvider;
use tracing::info;

/// Reads a discovery document from disk instead of a live database.
#[derive(Debug, Clone)]
pub struct JsonFileDiscovery {
    path: PathBuf,
}

impl JsonFileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiscoveryProvider for JsonFileDiscovery {
    async fn discover(&self, project_ref: &str) -> anyhow::Result<DiscoveryDocument> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let doc: DiscoveryDocument = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        info!(
            project_ref,
            path = %self.path.display(),
            tables = doc.tables.len(),
            "Loaded discovery document"
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_reads_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tables": [{{"schema": "public", "name": "orders",
                "columns": [{{"name": "id", "type": "bigint", "nullable": false}}],
                "primary_key": ["id"], "rls_enabled": true}}]}}"#
        )
        .unwrap();

        let doc = JsonFileDiscovery::new(file.path())
            .discover("abc")
            .await
            .unwrap();
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].name, "orders");
        assert!(doc.tables[0].rls_enabled);
        assert!(doc.limitations.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonFileDiscovery::new(dir.path().join("absent.json"))
            .discover("abc")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("absent.json"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"tables\": 3}}").unwrap();
        let err = JsonFileDiscovery::new(file.path())
            .discover("abc")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("parsing"));
    }
}
