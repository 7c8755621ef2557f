//! `supaforge compile` turns a saved discovery document into tools JSON.

use crate::SelectionArgs;
use std::path::Path;
use supaforge_adapter_pg::JsonFileDiscovery;
use supaforge_compiler::{CompileRequest, compile};
use supaforge_core::{DiscoveryDocument, DiscoverySnapshot, ForgeConfig};
use supaforge_runtime::{DiscoveryProvider, ToolsBlock};
use tracing::warn;

pub async fn run(config: &ForgeConfig, discovery: &Path, selection: &SelectionArgs) -> anyhow::Result<()> {
    let doc = JsonFileDiscovery::new(discovery)
        .discover(&discovery.display().to_string())
        .await?;
    let block = compile_document(config, doc, selection);
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

/// Compile `doc`, falling back to the configured default categories when
/// none were selected.
pub fn compile_document(
    config: &ForgeConfig,
    doc: DiscoveryDocument,
    selection: &SelectionArgs,
) -> ToolsBlock {
    let snapshot = DiscoverySnapshot::from_document_lenient(doc);
    for limitation in snapshot.limitations() {
        warn!(tool = %limitation.tool, error = %limitation.error, "Discovery limitation");
    }

    let categories = if selection.categories.is_empty() {
        config.compiler.default_categories.clone()
    } else {
        selection.categories.clone()
    };
    let mut request =
        CompileRequest::new(categories).allow_sensitive_writes(selection.allow_sensitive_writes);
    if !selection.tables.is_empty() {
        request = request.with_tables(selection.tables.iter().cloned());
    }

    let output = compile(&snapshot, &config.compiler, &request);
    ToolsBlock {
        tools: output.tools,
        skipped: output.skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use supaforge_core::Operation;

    fn document() -> DiscoveryDocument {
        serde_json::from_value(json!({
            "tables": [{
                "schema": "public", "name": "orders",
                "columns": [
                    {"name": "id", "type": "bigint", "nullable": false},
                    {"name": "total", "type": "numeric"}
                ],
                "primary_key": ["id"],
                "rls_enabled": true,
                "policies": [{"name": "own_orders", "command": "ALL"}]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_to_configured_categories() {
        let block = compile_document(&ForgeConfig::default(), document(), &SelectionArgs::default());
        assert!(!block.tools.is_empty());
        assert!(block.tools.iter().all(|t| t.operation == Operation::Select));
    }

    #[test]
    fn test_selected_categories_and_unknown_table() {
        let selection = SelectionArgs {
            categories: vec![Operation::Select, Operation::Update],
            tables: vec!["orders".into(), "missing".into()],
            allow_sensitive_writes: false,
        };
        let block = compile_document(&ForgeConfig::default(), document(), &selection);
        assert!(block.tools.iter().any(|t| t.operation == Operation::Update));
        assert!(block.skipped.iter().any(|s| s.resource == "missing"));
    }
}
