//! Statement execution against the configuration store.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgQueryResult};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use supaforge_core::ConfigurationRow;
use supaforge_provision::{ConfigTarget, ProvisionState, SqlParam, Statement, StatementSet};
use supaforge_runtime::{ExecutionReport, SqlExecutor};
use tracing::{debug, info};

/// Runs planned statements on the project's database and reads back what
/// provisioning left there.
pub struct PgConfigStore {
    pool: PgPool,
    target: ConfigTarget,
}

impl PgConfigStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            target: ConfigTarget::fixed(),
        }
    }

    /// The active configuration for `email`, if one is stored.
    pub async fn active_configuration(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<ConfigurationRow>> {
        let sql = format!(
            r#"
            select id, email, project_name, version, tools, is_active, created_at, updated_at
            from {}
            where email = $1 and is_active
            "#,
            self.target.qualified_ident()
        );
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let tools: Json<serde_json::Value> = row.get("tools");
            ConfigurationRow {
                id: row.get("id"),
                email: row.get("email"),
                project_name: row.get("project_name"),
                version: row.get("version"),
                tools: tools.0,
                is_active: row.get("is_active"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }
        }))
    }
}

async fn run_statement<'e, E>(executor: E, statement: &'e Statement) -> anyhow::Result<PgQueryResult>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    debug!(statement = %statement.kind.label(), "Executing");
    let result = if statement.params.is_empty() {
        executor.execute(sqlx::raw_sql(&statement.sql)).await
    } else {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                SqlParam::Text(s) => query.bind(s.clone()),
                SqlParam::Json(v) => query.bind(Json(v.clone())),
                SqlParam::Null => query.bind(None::<String>),
            };
        }
        executor.execute(query).await
    };
    result.with_context(|| format!("{} failed", statement.kind.label()))
}

#[async_trait]
impl SqlExecutor for PgConfigStore {
    async fn execute(&self, set: &StatementSet) -> anyhow::Result<ExecutionReport> {
        if set.transactional {
            let mut tx = self.pool.begin().await?;
            for statement in &set.statements {
                run_statement(&mut *tx, statement).await?;
            }
            tx.commit().await?;
        } else {
            for statement in &set.statements {
                run_statement(&self.pool, statement).await?;
            }
        }

        info!(
            statements = set.len(),
            transactional = set.transactional,
            target = %self.target.display_name(),
            "Executed statement set"
        );
        Ok(ExecutionReport {
            statements_run: set.len(),
            message: format!(
                "executed {} statement(s) on {}",
                set.len(),
                self.target.display_name()
            ),
        })
    }

    async fn provisioned_objects(&self) -> anyhow::Result<ProvisionState> {
        let table = sqlx::query(
            r#"
            select c.relrowsecurity as rls_enabled
            from pg_catalog.pg_class c
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            where n.nspname = $1 and c.relname = $2 and c.relkind in ('r', 'p')
            "#,
        )
        .bind(self.target.schema())
        .bind(self.target.table())
        .fetch_optional(&self.pool)
        .await?;

        let Some(table) = table else {
            return Ok(ProvisionState::fresh());
        };

        let indexes = sqlx::query(
            "select indexname::text as name from pg_catalog.pg_indexes where schemaname = $1 and tablename = $2",
        )
        .bind(self.target.schema())
        .bind(self.target.table())
        .fetch_all(&self.pool)
        .await?;

        let policies = sqlx::query(
            "select policyname::text as name from pg_catalog.pg_policies where schemaname = $1 and tablename = $2",
        )
        .bind(self.target.schema())
        .bind(self.target.table())
        .fetch_all(&self.pool)
        .await?;

        Ok(ProvisionState {
            table_exists: true,
            indexes: indexes.iter().map(|r| r.get::<String, _>("name")).collect(),
            rls_enabled: table.get("rls_enabled"),
            policies: policies.iter().map(|r| r.get::<String, _>("name")).collect(),
        })
    }
}
