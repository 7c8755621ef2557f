//! `supaforge sql` prints the configuration-store SQL block without running it.

use crate::DatabaseArgs;
use anyhow::Context;
use std::path::PathBuf;
use supaforge_adapter_pg::PgConfigStore;
use supaforge_core::ToolsDocument;
use supaforge_provision::{
    ProvisionState, SetupOutcome, VersionedInsert, plan_setup, plan_versioned_insert, setup_notes,
};
use supaforge_runtime::{SqlBlock, SqlExecutor};

pub async fn run(
    db: &DatabaseArgs,
    email: Option<String>,
    tools: Option<PathBuf>,
    project_name: Option<String>,
) -> anyhow::Result<()> {
    let state = match db.database_url.as_deref() {
        Some(url) => PgConfigStore::connect(url)
            .await
            .context("Failed to connect to the database")?
            .provisioned_objects()
            .await
            .context("Failed to inspect the configuration store")?,
        None => ProvisionState::fresh(),
    };

    let insert = match (email, tools) {
        (Some(email), Some(path)) => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read tools file: {:?}", path))?;
            let tools: ToolsDocument = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse tools file: {:?}", path))?;
            Some(VersionedInsert {
                email,
                project_name,
                tools,
            })
        }
        _ => None,
    };

    let block = sql_block(&state, insert.as_ref());
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

/// Setup SQL for whatever `state` lacks, plus the insert when the observed
/// store already carries every setup object.
pub fn sql_block(state: &ProvisionState, insert: Option<&VersionedInsert>) -> SqlBlock {
    let setup = plan_setup(state);
    let mut notes = setup_notes();
    if setup.is_empty() {
        notes.push("configuration store already provisioned; no setup statements needed".to_string());
    }

    let insert_sql = insert.and_then(|insert| {
        match plan_versioned_insert(&SetupOutcome::observe(state), insert) {
            Ok(set) => Some(set.render()),
            Err(e) => {
                notes.push(format!("insert withheld: {}", e));
                None
            }
        }
    });

    SqlBlock {
        sql: setup.render(),
        executed: false,
        execution_result: None,
        notes,
        insert_sql,
    }
}
