//! `supaforge discover` prints the discovery document as JSON.

use crate::DatabaseArgs;
use anyhow::Context;
use supaforge_adapter_pg::PgDiscovery;
use supaforge_core::ForgeConfig;
use supaforge_runtime::DiscoveryProvider;

pub async fn run(config: &ForgeConfig, db: &DatabaseArgs, project_ref: &str) -> anyhow::Result<()> {
    let url = db
        .database_url
        .as_deref()
        .context("--database-url (or SUPAFORGE_DATABASE_URL) is required")?;
    let discovery = PgDiscovery::connect(url, config.discovery.clone())
        .await
        .context("Failed to connect to the database")?;
    let doc = discovery.discover(project_ref).await?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
