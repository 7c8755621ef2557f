//! Collaborators selected from command-line flags.

use async_trait::async_trait;
use std::path::PathBuf;
use supaforge_adapter_pg::{JsonFileDiscovery, PgConfigStore, PgDiscovery};
use supaforge_core::{DiscoveryConfig, DiscoveryDocument};
use supaforge_provision::{ProvisionState, StatementSet};
use supaforge_runtime::{DiscoveryProvider, ExecutionReport, NoExecutor, SqlExecutor};

pub enum Discovery {
    Database(PgDiscovery),
    File(JsonFileDiscovery),
}

impl Discovery {
    /// A saved document wins over a live connection.
    pub async fn open(
        file: Option<PathBuf>,
        database_url: Option<&str>,
        config: &DiscoveryConfig,
    ) -> anyhow::Result<Self> {
        match (file, database_url) {
            (Some(path), _) => Ok(Discovery::File(JsonFileDiscovery::new(path))),
            (None, Some(url)) => Ok(Discovery::Database(
                PgDiscovery::connect(url, config.clone()).await?,
            )),
            (None, None) => {
                anyhow::bail!("either --discovery or --database-url (SUPAFORGE_DATABASE_URL) is required")
            }
        }
    }
}

#[async_trait]
impl DiscoveryProvider for Discovery {
    async fn discover(&self, project_ref: &str) -> anyhow::Result<DiscoveryDocument> {
        match self {
            Discovery::Database(d) => d.discover(project_ref).await,
            Discovery::File(d) => d.discover(project_ref).await,
        }
    }
}

pub enum Executor {
    Database(PgConfigStore),
    Disabled(NoExecutor),
}

impl Executor {
    pub async fn open(database_url: Option<&str>) -> anyhow::Result<Self> {
        match database_url {
            Some(url) => Ok(Executor::Database(PgConfigStore::connect(url).await?)),
            None => Ok(Executor::Disabled(NoExecutor)),
        }
    }
}

#[async_trait]
impl SqlExecutor for Executor {
    async fn execute(&self, set: &StatementSet) -> anyhow::Result<ExecutionReport> {
        match self {
            Executor::Database(e) => e.execute(set).await,
            Executor::Disabled(e) => e.execute(set).await,
        }
    }

    async fn provisioned_objects(&self) -> anyhow::Result<ProvisionState> {
        match self {
            Executor::Database(e) => e.provisioned_objects().await,
            Executor::Disabled(e) => e.provisioned_objects().await,
        }
    }
}
