//! Read-only discovery over a direct Postgres connection.
//!
//! Each catalog section is fetched with one query across all configured
//! schemas. The table list is mandatory; every other section degrades to a
//! [`Limitation`] when its query fails.

use crate::sensitive::SensitiveClassifier;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use supaforge_core::{
    ColumnDocument, DbFunction, DiscoveryConfig, DiscoveryDocument, Extension, ForeignKey,
    FunctionArg, Limitation, Policy, PolicyCommand, TableDocument, UniqueIndex,
};
use supaforge_runtime::DiscoveryProvider;
use tracing::{debug, info, warn};

const TOOL_TABLES: &str = "list_tables";
const TOOL_COLUMNS: &str = "list_columns";
const TOOL_CONSTRAINTS: &str = "list_constraints";
const TOOL_UNIQUE_INDEXES: &str = "list_unique_indexes";
const TOOL_POLICIES: &str = "list_policies";
const TOOL_FUNCTIONS: &str = "list_db_functions";
const TOOL_EXTENSIONS: &str = "list_extensions";
const TOOL_EDGE_FUNCTIONS: &str = "list_edge_functions";

/// Discovery against the project's database.
pub struct PgDiscovery {
    pool: PgPool,
    config: DiscoveryConfig,
    classifier: SensitiveClassifier,
}

impl PgDiscovery {
    pub async fn connect(database_url: &str, config: DiscoveryConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::with_pool(pool, config)
    }

    pub fn with_pool(pool: PgPool, config: DiscoveryConfig) -> anyhow::Result<Self> {
        let classifier = SensitiveClassifier::new(&config.sensitive_patterns)?;
        Ok(Self {
            pool,
            config,
            classifier,
        })
    }

    async fn tables(&self) -> anyhow::Result<Vec<TableDocument>> {
        let rows = sqlx::query(
            r#"
            select n.nspname::text as table_schema,
                   c.relname::text as table_name,
                   c.relrowsecurity as rls_enabled
            from pg_catalog.pg_class c
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            where c.relkind in ('r', 'p')
              and n.nspname = any($1)
            order by n.nspname, c.relname
            "#,
        )
        .bind(&self.config.schemas[..])
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TableDocument {
                schema: row.get("table_schema"),
                name: row.get("table_name"),
                columns: Vec::new(),
                primary_key: None,
                foreign_keys: Vec::new(),
                unique_indexes: Vec::new(),
                rls_enabled: row.get("rls_enabled"),
                policies: Vec::new(),
                sensitive_columns: Vec::new(),
            })
            .collect())
    }

    async fn attach_columns(&self, tables: &mut TableIndex<'_>) -> anyhow::Result<()> {
        let rows = sqlx::query(
            r#"
            select table_schema::text as table_schema,
                   table_name::text as table_name,
                   column_name::text as column_name,
                   case when data_type in ('USER-DEFINED', 'ARRAY') then udt_name::text
                        else data_type::text end as data_type,
                   is_nullable::text as is_nullable,
                   column_default::text as column_default
            from information_schema.columns
            where table_schema = any($1)
            order by table_schema, table_name, ordinal_position
            "#,
        )
        .bind(&self.config.schemas[..])
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let Some(table) = tables.get(row.get("table_schema"), row.get("table_name")) else {
                continue;
            };
            let name: String = row.get("column_name");
            let is_nullable: String = row.get("is_nullable");
            if self.classifier.is_sensitive(&name) {
                table.sensitive_columns.push(name.clone());
            }
            table.columns.push(ColumnDocument {
                name,
                data_type: row.get("data_type"),
                nullable: is_nullable == "YES",
                default: row.get("column_default"),
            });
        }
        Ok(())
    }

    async fn attach_constraints(&self, tables: &mut TableIndex<'_>) -> anyhow::Result<()> {
        let rows = sqlx::query(
            r#"
            select n.nspname::text as table_schema,
                   c.relname::text as table_name,
                   con.conname::text as constraint_name,
                   con.contype::text as kind,
                   array(select a.attname::text
                         from unnest(con.conkey) with ordinality k(attnum, ord)
                         join pg_catalog.pg_attribute a
                           on a.attrelid = con.conrelid and a.attnum = k.attnum
                         order by k.ord) as columns,
                   rn.nspname::text as ref_schema,
                   rc.relname::text as ref_table,
                   array(select a.attname::text
                         from unnest(con.confkey) with ordinality k(attnum, ord)
                         join pg_catalog.pg_attribute a
                           on a.attrelid = con.confrelid and a.attnum = k.attnum
                         order by k.ord) as ref_columns
            from pg_catalog.pg_constraint con
            join pg_catalog.pg_class c on c.oid = con.conrelid
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            left join pg_catalog.pg_class rc on rc.oid = con.confrelid
            left join pg_catalog.pg_namespace rn on rn.oid = rc.relnamespace
            where con.contype in ('p', 'f')
              and n.nspname = any($1)
            order by n.nspname, c.relname, con.conname
            "#,
        )
        .bind(&self.config.schemas[..])
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let Some(table) = tables.get(row.get("table_schema"), row.get("table_name")) else {
                continue;
            };
            let kind: String = row.get("kind");
            let columns: Vec<String> = row.get("columns");
            if kind == "p" {
                table.primary_key = Some(columns);
                continue;
            }
            let ref_table: Option<String> = row.get("ref_table");
            let Some(ref_table) = ref_table else {
                continue;
            };
            let ref_schema: Option<String> = row.get("ref_schema");
            table.foreign_keys.push(ForeignKey {
                constraint: row.get("constraint_name"),
                columns,
                ref_schema,
                ref_table,
                ref_columns: row.get("ref_columns"),
            });
        }
        Ok(())
    }

    async fn attach_unique_indexes(&self, tables: &mut TableIndex<'_>) -> anyhow::Result<()> {
        // Partial and expression indexes cannot back an upsert target.
        let rows = sqlx::query(
            r#"
            select n.nspname::text as table_schema,
                   c.relname::text as table_name,
                   ic.relname::text as index_name,
                   array(select a.attname::text
                         from unnest(i.indkey::int2[]) with ordinality k(attnum, ord)
                         join pg_catalog.pg_attribute a
                           on a.attrelid = i.indrelid and a.attnum = k.attnum
                         order by k.ord) as columns
            from pg_catalog.pg_index i
            join pg_catalog.pg_class c on c.oid = i.indrelid
            join pg_catalog.pg_class ic on ic.oid = i.indexrelid
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            where i.indisunique
              and not i.indisprimary
              and i.indpred is null
              and not (0 = any(i.indkey::int2[]))
              and n.nspname = any($1)
            order by n.nspname, c.relname, ic.relname
            "#,
        )
        .bind(&self.config.schemas[..])
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let Some(table) = tables.get(row.get("table_schema"), row.get("table_name")) else {
                continue;
            };
            table.unique_indexes.push(UniqueIndex {
                name: row.get("index_name"),
                columns: row.get("columns"),
            });
        }
        Ok(())
    }

    async fn attach_policies(
        &self,
        tables: &mut TableIndex<'_>,
        limitations: &mut Vec<Limitation>,
    ) -> anyhow::Result<()> {
        let rows = sqlx::query(
            r#"
            select schemaname::text as table_schema,
                   tablename::text as table_name,
                   policyname::text as policy_name,
                   cmd::text as cmd,
                   qual::text as using_expr,
                   with_check::text as check_expr
            from pg_catalog.pg_policies
            where schemaname = any($1)
            order by schemaname, tablename, policyname
            "#,
        )
        .bind(&self.config.schemas[..])
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let schema: String = row.get("table_schema");
            let table_name: String = row.get("table_name");
            let name: String = row.get("policy_name");
            let cmd: String = row.get("cmd");
            let Some(command) = policy_command(&cmd) else {
                limitations.push(Limitation::new(
                    TOOL_POLICIES,
                    format!(
                        "policy {} on {}.{} has unrecognized command {}",
                        name, schema, table_name, cmd
                    ),
                ));
                continue;
            };
            let Some(table) = tables.get(schema, table_name) else {
                continue;
            };
            table.policies.push(Policy {
                name,
                command,
                using: row.get("using_expr"),
                with_check: row.get("check_expr"),
            });
        }
        Ok(())
    }

    async fn functions(&self) -> anyhow::Result<Vec<DbFunction>> {
        let rows = sqlx::query(
            r#"
            select n.nspname::text as fn_schema,
                   p.proname::text as fn_name,
                   coalesce(p.proargnames, array[]::text[]) as arg_names,
                   coalesce(p.proargmodes::text[], array[]::text[]) as arg_modes,
                   array(select format_type(t.oid, null)
                         from unnest(p.proargtypes::oid[]) with ordinality a(oid, ord)
                         join pg_catalog.pg_type t on t.oid = a.oid
                         order by a.ord) as arg_types,
                   pg_catalog.pg_get_function_result(p.oid) as returns,
                   case p.provolatile
                        when 'i' then 'immutable'
                        when 's' then 'stable'
                        else 'volatile' end as volatility,
                   case when not exists (select 1 from pg_catalog.pg_roles where rolname = 'authenticated')
                             then null
                        when has_function_privilege('authenticated', p.oid, 'execute')
                             then null
                        else 'service_role' end as required_role
            from pg_catalog.pg_proc p
            join pg_catalog.pg_namespace n on n.oid = p.pronamespace
            where p.prokind = 'f'
              and p.prorettype <> 'pg_catalog.trigger'::regtype
              and n.nspname = any($1)
              and not exists (
                  select 1 from pg_catalog.pg_depend d
                  where d.objid = p.oid and d.deptype = 'e'
              )
            order by n.nspname, p.proname
            "#,
        )
        .bind(&self.config.schemas[..])
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let names: Vec<String> = row.get("arg_names");
                let modes: Vec<String> = row.get("arg_modes");
                let types: Vec<String> = row.get("arg_types");
                DbFunction {
                    schema: row.get("fn_schema"),
                    name: row.get("fn_name"),
                    args: function_args(&names, &modes, types),
                    returns: row.get("returns"),
                    volatility: row.get("volatility"),
                    required_role: row.get("required_role"),
                }
            })
            .collect())
    }

    async fn extensions(&self) -> anyhow::Result<Vec<Extension>> {
        let rows = sqlx::query(
            "select extname::text as name, extversion::text as version from pg_catalog.pg_extension order by extname",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Extension {
                name: row.get("name"),
                version: row.get("version"),
            })
            .collect())
    }
}

#[async_trait]
impl DiscoveryProvider for PgDiscovery {
    async fn discover(&self, project_ref: &str) -> anyhow::Result<DiscoveryDocument> {
        info!(project_ref, schemas = ?self.config.schemas, "Discovering database");

        let mut limitations = Vec::new();
        let mut tables = self.tables().await?;
        truncate(&mut tables, self.config.max_items, TOOL_TABLES, "tables", &mut limitations);

        {
            let mut index = TableIndex::new(&mut tables);
            if let Err(e) = self.attach_columns(&mut index).await {
                section_failed(&mut limitations, TOOL_COLUMNS, e);
            }
            if let Err(e) = self.attach_constraints(&mut index).await {
                section_failed(&mut limitations, TOOL_CONSTRAINTS, e);
            }
            if let Err(e) = self.attach_unique_indexes(&mut index).await {
                section_failed(&mut limitations, TOOL_UNIQUE_INDEXES, e);
            }
            let mut policy_notes = Vec::new();
            if let Err(e) = self.attach_policies(&mut index, &mut policy_notes).await {
                section_failed(&mut limitations, TOOL_POLICIES, e);
            }
            limitations.extend(policy_notes);
        }

        let mut db_functions = match self.functions().await {
            Ok(functions) => functions,
            Err(e) => {
                section_failed(&mut limitations, TOOL_FUNCTIONS, e);
                Vec::new()
            }
        };
        truncate(
            &mut db_functions,
            self.config.max_items,
            TOOL_FUNCTIONS,
            "functions",
            &mut limitations,
        );

        let mut extensions = match self.extensions().await {
            Ok(extensions) => extensions,
            Err(e) => {
                section_failed(&mut limitations, TOOL_EXTENSIONS, e);
                Vec::new()
            }
        };
        truncate(
            &mut extensions,
            self.config.max_items,
            TOOL_EXTENSIONS,
            "extensions",
            &mut limitations,
        );

        limitations.push(Limitation::new(
            TOOL_EDGE_FUNCTIONS,
            "edge functions are not visible over a database connection",
        ));

        info!(
            tables = tables.len(),
            functions = db_functions.len(),
            extensions = extensions.len(),
            limitations = limitations.len(),
            "Discovery complete"
        );

        Ok(DiscoveryDocument {
            edge_functions: Vec::new(),
            db_functions,
            tables,
            extensions,
            limitations,
        })
    }
}

/// Lookup of discovered tables by schema and name.
struct TableIndex<'a> {
    tables: &'a mut [TableDocument],
    positions: BTreeMap<(String, String), usize>,
}

impl<'a> TableIndex<'a> {
    fn new(tables: &'a mut [TableDocument]) -> Self {
        let positions = tables
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.schema.clone(), t.name.clone()), i))
            .collect();
        Self { tables, positions }
    }

    fn get(&mut self, schema: String, name: String) -> Option<&mut TableDocument> {
        let i = *self.positions.get(&(schema, name))?;
        self.tables.get_mut(i)
    }
}

fn section_failed(limitations: &mut Vec<Limitation>, tool: &str, error: anyhow::Error) {
    warn!(tool, error = %error, "Discovery section failed");
    limitations.push(Limitation::new(tool, error.to_string()));
}

fn truncate<T>(
    items: &mut Vec<T>,
    max_items: usize,
    tool: &str,
    noun: &str,
    limitations: &mut Vec<Limitation>,
) {
    if items.len() <= max_items {
        return;
    }
    let total = items.len();
    items.truncate(max_items);
    debug!(tool, total, kept = max_items, "Truncated discovery list");
    limitations.push(Limitation::new(
        tool,
        format!("truncated to {} of {} {}", max_items, total, noun),
    ));
}

/// Map `pg_policies.cmd` to a policy command.
pub(crate) fn policy_command(cmd: &str) -> Option<PolicyCommand> {
    match cmd.to_ascii_uppercase().as_str() {
        "ALL" | "*" => Some(PolicyCommand::All),
        "SELECT" | "R" => Some(PolicyCommand::Select),
        "INSERT" | "A" => Some(PolicyCommand::Insert),
        "UPDATE" | "W" => Some(PolicyCommand::Update),
        "DELETE" | "D" => Some(PolicyCommand::Delete),
        _ => None,
    }
}

/// Pair input argument types with their names.
///
/// `names` and `modes` cover every argument including `OUT` ones when
/// `modes` is non-empty; `types` covers input arguments only.
pub(crate) fn function_args(names: &[String], modes: &[String], types: Vec<String>) -> Vec<FunctionArg> {
    let input_names: Vec<&str> = if modes.is_empty() {
        names.iter().map(String::as_str).collect()
    } else {
        modes
            .iter()
            .enumerate()
            .filter(|(_, mode)| matches!(mode.as_str(), "i" | "b" | "v"))
            .map(|(i, _)| names.get(i).map(String::as_str).unwrap_or(""))
            .collect()
    };

    types
        .into_iter()
        .enumerate()
        .map(|(i, arg_type)| FunctionArg {
            name: input_names.get(i).copied().unwrap_or("").to_string(),
            arg_type,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_policy_command_mapping() {
        assert_eq!(policy_command("SELECT"), Some(PolicyCommand::Select));
        assert_eq!(policy_command("all"), Some(PolicyCommand::All));
        assert_eq!(policy_command("*"), Some(PolicyCommand::All));
        assert_eq!(policy_command("d"), Some(PolicyCommand::Delete));
        assert_eq!(policy_command("TRUNCATE"), None);
    }

    #[test]
    fn test_function_args_without_modes() {
        let args = function_args(
            &strings(&["user_id", "since"]),
            &[],
            strings(&["uuid", "timestamp with time zone"]),
        );
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "user_id");
        assert_eq!(args[1].arg_type, "timestamp with time zone");
    }

    #[test]
    fn test_function_args_skip_out_parameters() {
        let args = function_args(
            &strings(&["q", "total", "lim"]),
            &strings(&["i", "o", "i"]),
            strings(&["text", "integer"]),
        );
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "q");
        assert_eq!(args[1].name, "lim");
        assert_eq!(args[1].arg_type, "integer");
    }

    #[test]
    fn test_function_args_unnamed() {
        let args = function_args(&[], &[], strings(&["integer"]));
        assert_eq!(args[0].name, "");
    }

    #[test]
    fn test_truncate_records_limitation() {
        let mut items: Vec<u32> = (0..5).collect();
        let mut limitations = Vec::new();
        truncate(&mut items, 3, TOOL_TABLES, "tables", &mut limitations);
        assert_eq!(items, vec![0, 1, 2]);
        assert_eq!(limitations.len(), 1);
        assert_eq!(limitations[0].tool, "list_tables");
        assert_eq!(limitations[0].error, "truncated to 3 of 5 tables");

        truncate(&mut items, 3, TOOL_TABLES, "tables", &mut limitations);
        assert_eq!(limitations.len(), 1);
    }
}
