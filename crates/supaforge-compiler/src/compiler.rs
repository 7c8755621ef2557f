//! Snapshot-driven tool compilation.
//!
//! ## Generation rules
//!
//! | Descriptor | Generated when | Inputs |
//! |------------|----------------|--------|
//! | `list_<table>` | `select` requested, table has a non-sensitive column | none (filters, order, pagination) |
//! | `insert_<entity>` | `insert` requested, every sensitive column can be left out | non-defaulted columns |
//! | `update_<entity>_<column>` | `update` requested, table has a primary key | primary key + target column |
//! | `delete_<entity>` | `delete` requested, primary key + RLS with an UPDATE/DELETE/ALL policy | primary key |
//! | `rpc_<function>` | `rpc` requested, every argument is named | discovered arguments verbatim |
//!
//! Whatever cannot be generated is listed in [`CompileOutput::skipped`]
//! with the reason; nothing is filled in with placeholders.

use crate::filters::operators_for;
use crate::naming::{NameRegistry, rpc_tool_name, table_tool_name};
use crate::priority::PriorityKey;
use crate::relationships;
use crate::validate::check_descriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use supaforge_core::{
    CompilerConfig, DbFunction, DiscoverySnapshot, Filter, FilterOp, ForgeError, InputParam,
    NullsOrder, Operation, OrderSpec, Pagination, PolicyCommand, ResourceRef, Table,
    ToolDescriptor,
};

/// What the caller asked the compiler for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileRequest {
    /// Requested categories.
    pub categories: BTreeSet<Operation>,
    /// Optional inclusion filter; entries are `table` or `schema.table`.
    pub tables: Option<BTreeSet<String>>,
    /// Operator acknowledged the risk of writing sensitive columns.
    pub allow_sensitive_writes: bool,
}

impl CompileRequest {
    pub fn new(categories: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_tables(mut self, tables: impl IntoIterator<Item = String>) -> Self {
        self.tables = Some(tables.into_iter().collect());
        self
    }

    pub fn allow_sensitive_writes(mut self, allow: bool) -> Self {
        self.allow_sensitive_writes = allow;
        self
    }

    fn wants(&self, op: Operation) -> bool {
        self.categories.contains(&op)
    }

    fn includes(&self, table: &Table) -> bool {
        match &self.tables {
            None => true,
            Some(names) => {
                names.contains(&table.name) || names.contains(&table.qualified_name().to_string())
            }
        }
    }
}

/// Why a descriptor was not produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// Discovery lacks a field the descriptor needs.
    Omitted,
    /// The descriptor would break a safety rule.
    Unsafe,
    /// Dropped by the tool cap.
    Capped,
}

/// A descriptor the compiler declined to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    pub resource: String,
    pub operation: Operation,
    pub kind: SkipKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub tools: Vec<ToolDescriptor>,
    pub skipped: Vec<Skipped>,
}

/// Compiles one snapshot into descriptors.
pub struct ToolCompiler<'a> {
    snapshot: &'a DiscoverySnapshot,
    config: &'a CompilerConfig,
}

struct Candidate {
    tool: ToolDescriptor,
    priority: PriorityKey,
}

impl<'a> ToolCompiler<'a> {
    pub fn new(snapshot: &'a DiscoverySnapshot, config: &'a CompilerConfig) -> Self {
        Self { snapshot, config }
    }

    /// Compile every requested descriptor, then apply the cap.
    pub fn compile(&self, request: &CompileRequest) -> CompileOutput {
        let allow_sensitive = request.allow_sensitive_writes || self.config.allow_sensitive_writes;
        let mut names = NameRegistry::default();
        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        if let Some(wanted) = &request.tables {
            for name in wanted {
                let known = self.snapshot.tables().iter().any(|t| {
                    &t.name == name || &t.qualified_name().to_string() == name
                });
                if !known {
                    for op in request.categories.iter().filter(|op| **op != Operation::Rpc) {
                        skipped.push(Skipped {
                            resource: name.clone(),
                            operation: *op,
                            kind: SkipKind::Omitted,
                            reason: "table not present in discovery".to_string(),
                        });
                    }
                }
            }
        }

        for table in self.snapshot.tables() {
            if !request.includes(table) {
                continue;
            }
            let priority = PriorityKey::for_table(self.snapshot, table);
            let mut drafts = Vec::new();

            if request.wants(Operation::Select) {
                drafts.push(self.select_tool(table, &mut names));
            }
            if request.wants(Operation::Insert) {
                drafts.push(self.insert_tool(table, allow_sensitive, &mut names));
            }
            if request.wants(Operation::Update) {
                drafts.extend(self.update_tools(table, allow_sensitive, &mut names));
            }
            if request.wants(Operation::Delete) {
                drafts.push(self.delete_tool(table, allow_sensitive, &mut names));
            }

            tracing::debug!(
                table = %table.qualified_name(),
                rls = table.rls_enabled,
                has_pk = table.has_primary_key(),
                drafts = drafts.len(),
                "Compiled table"
            );

            for draft in drafts {
                self.admit(draft, &priority, allow_sensitive, &mut candidates, &mut skipped);
            }
        }

        if request.wants(Operation::Rpc) {
            for function in self.snapshot.functions() {
                let priority = PriorityKey::for_function(&function.schema, &function.name);
                let draft = self.rpc_tool(function, &mut names);
                self.admit(draft, &priority, allow_sensitive, &mut candidates, &mut skipped);
            }
        }

        let tools = self.apply_cap(candidates, &mut skipped);

        tracing::info!(
            tools = tools.len(),
            skipped = skipped.len(),
            cap = self.config.max_tools,
            "Tool compilation finished"
        );

        CompileOutput { tools, skipped }
    }

    /// Route a draft through the final gate into candidates or skipped.
    fn admit(
        &self,
        draft: Result<ToolDescriptor, Skipped>,
        priority: &PriorityKey,
        allow_sensitive: bool,
        candidates: &mut Vec<Candidate>,
        skipped: &mut Vec<Skipped>,
    ) {
        let tool = match draft {
            Ok(tool) => tool,
            Err(skip) => {
                tracing::debug!(
                    resource = %skip.resource,
                    operation = %skip.operation,
                    reason = %skip.reason,
                    "Descriptor skipped"
                );
                skipped.push(skip);
                return;
            }
        };
        match check_descriptor(&tool, self.snapshot, allow_sensitive) {
            Ok(()) => candidates.push(Candidate {
                tool,
                priority: priority.clone(),
            }),
            Err(err) => {
                tracing::warn!(tool = %tool.name, error = %err, "Descriptor rejected by final check");
                skipped.push(Skipped {
                    resource: tool.resource.to_string(),
                    operation: tool.operation,
                    kind: SkipKind::Unsafe,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn apply_cap(&self, mut candidates: Vec<Candidate>, skipped: &mut Vec<Skipped>) -> Vec<ToolDescriptor> {
        let cap = self.config.max_tools;
        if candidates.len() <= cap {
            return candidates.into_iter().map(|c| c.tool).collect();
        }

        // sort_by is stable: descriptors of one resource keep their order.
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority));
        let dropped = candidates.split_off(cap);
        tracing::warn!(
            cap,
            dropped = dropped.len(),
            "Tool cap exceeded; dropping lowest-priority descriptors"
        );
        for c in dropped {
            skipped.push(Skipped {
                resource: c.tool.resource.to_string(),
                operation: c.tool.operation,
                kind: SkipKind::Capped,
                reason: format!("{} dropped: exceeds tool cap of {}", c.tool.name, cap),
            });
        }
        candidates.into_iter().map(|c| c.tool).collect()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    fn select_tool(&self, table: &Table, names: &mut NameRegistry) -> Result<ToolDescriptor, Skipped> {
        if table.columns.is_empty() {
            return Err(omission(table, Operation::Select, "no columns discovered"));
        }

        let select: Vec<String> = table
            .columns
            .iter()
            .filter(|c| !c.sensitive)
            .map(|c| c.name.clone())
            .collect();
        if select.is_empty() {
            return Err(omission(
                table,
                Operation::Select,
                "every discovered column is sensitive; no default selection possible",
            ));
        }
        let available: Vec<String> = table.sensitive_columns().map(|c| c.name.clone()).collect();

        let filters: Vec<Filter> = table
            .columns
            .iter()
            .filter(|c| !c.sensitive)
            .flat_map(|c| {
                operators_for(&c.data_type).iter().map(move |op| Filter {
                    column: c.name.clone(),
                    op: *op,
                })
            })
            .collect();

        let order_by = table
            .primary_key_names()
            .first()
            .filter(|pk| table.column(pk).is_some_and(|c| !c.sensitive))
            .cloned()
            .unwrap_or_else(|| select[0].clone());

        let (requires_service_role, caveats) =
            security(table, Operation::Select, &[PolicyCommand::Select, PolicyCommand::All]);

        let description = if available.is_empty() {
            format!("List rows from {} with filters, ordering and pagination", table.qualified_name())
        } else {
            format!(
                "List rows from {} with filters, ordering and pagination; sensitive columns ({}) are excluded by default",
                table.qualified_name(),
                available.join(", ")
            )
        };

        Ok(ToolDescriptor {
            name: names.claim(table_tool_name("list", &table.schema, &table.name, None)),
            description,
            operation: Operation::Select,
            resource: ResourceRef::table(&table.schema, &table.name),
            inputs: BTreeMap::new(),
            filters,
            select,
            available,
            order: Some(OrderSpec {
                by: order_by,
                ascending: true,
                nulls: NullsOrder::Auto,
            }),
            pagination: Some(Pagination {
                limit: self.config.default_limit,
                offset: 0,
            }),
            relationships: relationships::derive(self.snapshot, table),
            requires_service_role,
            caveats,
        })
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    fn insert_tool(
        &self,
        table: &Table,
        allow_sensitive: bool,
        names: &mut NameRegistry,
    ) -> Result<ToolDescriptor, Skipped> {
        if table.columns.is_empty() {
            return Err(omission(table, Operation::Insert, "no columns discovered"));
        }
        if !allow_sensitive {
            if let Some(col) = table.sensitive_columns().find(|c| c.is_required_on_insert()) {
                return Err(unsafe_op(
                    table,
                    Operation::Insert,
                    format!(
                        "sensitive column {} is NOT NULL without a default and cannot be left out",
                        col.name
                    ),
                ));
            }
        }

        // Defaulted columns are server-managed and never inputs.
        let inputs: BTreeMap<String, InputParam> = table
            .columns
            .iter()
            .filter(|c| c.default.is_none())
            .filter(|c| allow_sensitive || !c.sensitive)
            .map(|c| {
                let param = if c.nullable {
                    InputParam::optional(&c.data_type)
                } else {
                    InputParam::required(&c.data_type)
                };
                (c.name.clone(), param)
            })
            .collect();

        let (requires_service_role, caveats) =
            security(table, Operation::Insert, &[PolicyCommand::Insert, PolicyCommand::All]);

        Ok(ToolDescriptor {
            name: names.claim(table_tool_name("insert", &table.schema, &table.name, None)),
            description: format!("Insert one row into {}", table.qualified_name()),
            operation: Operation::Insert,
            resource: ResourceRef::table(&table.schema, &table.name),
            inputs,
            filters: Vec::new(),
            select: Vec::new(),
            available: Vec::new(),
            order: None,
            pagination: None,
            relationships: Vec::new(),
            requires_service_role,
            caveats,
        })
    }

    /// One descriptor per non-key column; each requires the key and the value.
    fn update_tools(
        &self,
        table: &Table,
        allow_sensitive: bool,
        names: &mut NameRegistry,
    ) -> Vec<Result<ToolDescriptor, Skipped>> {
        if !table.has_primary_key() {
            return vec![Err(omission(table, Operation::Update, "table has no primary key"))];
        }
        if let Some(err) = sensitive_key(table, Operation::Update, allow_sensitive) {
            return vec![Err(err)];
        }

        let targets: Vec<_> = table
            .columns
            .iter()
            .filter(|c| !table.is_primary_key_column(&c.name))
            .collect();
        if targets.is_empty() {
            return vec![Err(omission(
                table,
                Operation::Update,
                "table has no non-key columns",
            ))];
        }

        let (requires_service_role, caveats) =
            security(table, Operation::Update, &[PolicyCommand::Update, PolicyCommand::All]);

        targets
            .into_iter()
            .map(|col| {
                if col.sensitive && !allow_sensitive {
                    return Err(unsafe_op(
                        table,
                        Operation::Update,
                        format!("column {} is sensitive", col.name),
                    ));
                }
                let mut inputs = key_inputs(table);
                inputs.insert(col.name.clone(), InputParam::required(&col.data_type));

                Ok(ToolDescriptor {
                    name: names.claim(table_tool_name(
                        "update",
                        &table.schema,
                        &table.name,
                        Some(&col.name),
                    )),
                    description: format!(
                        "Set {} on one row of {} identified by primary key ({})",
                        col.name,
                        table.qualified_name(),
                        table.primary_key_names().join(", ")
                    ),
                    operation: Operation::Update,
                    resource: ResourceRef::table(&table.schema, &table.name),
                    inputs,
                    filters: key_filters(table),
                    select: Vec::new(),
                    available: Vec::new(),
                    order: None,
                    pagination: None,
                    relationships: Vec::new(),
                    requires_service_role,
                    caveats: caveats.clone(),
                })
            })
            .collect()
    }

    fn delete_tool(
        &self,
        table: &Table,
        allow_sensitive: bool,
        names: &mut NameRegistry,
    ) -> Result<ToolDescriptor, Skipped> {
        if !table.has_primary_key() {
            return Err(omission(table, Operation::Delete, "table has no primary key"));
        }
        if let Some(err) = sensitive_key(table, Operation::Delete, allow_sensitive) {
            return Err(err);
        }
        if !table.rls_enabled {
            return Err(unsafe_op(
                table,
                Operation::Delete,
                "RLS is disabled; no policy scopes deletes".to_string(),
            ));
        }
        let scoping = table.policies_for(&[
            PolicyCommand::Update,
            PolicyCommand::Delete,
            PolicyCommand::All,
        ]);
        if scoping.is_empty() {
            return Err(unsafe_op(
                table,
                Operation::Delete,
                "no UPDATE, DELETE or ALL policy indicates scoped access".to_string(),
            ));
        }

        let (requires_service_role, caveats) =
            security(table, Operation::Delete, &[PolicyCommand::Delete, PolicyCommand::All]);

        Ok(ToolDescriptor {
            name: names.claim(table_tool_name("delete", &table.schema, &table.name, None)),
            description: format!(
                "Delete one row of {} identified by primary key ({})",
                table.qualified_name(),
                table.primary_key_names().join(", ")
            ),
            operation: Operation::Delete,
            resource: ResourceRef::table(&table.schema, &table.name),
            inputs: key_inputs(table),
            filters: key_filters(table),
            select: Vec::new(),
            available: Vec::new(),
            order: None,
            pagination: None,
            relationships: Vec::new(),
            requires_service_role,
            caveats,
        })
    }

    // -------------------------------------------------------------------------
    // RPC
    // -------------------------------------------------------------------------

    fn rpc_tool(&self, function: &DbFunction, names: &mut NameRegistry) -> Result<ToolDescriptor, Skipped> {
        let resource = function.signature();
        let omit = |reason: String| Skipped {
            resource: resource.clone(),
            operation: Operation::Rpc,
            kind: SkipKind::Omitted,
            reason,
        };

        let mut inputs = BTreeMap::new();
        for (idx, arg) in function.args.iter().enumerate() {
            if arg.name.trim().is_empty() {
                return Err(omit(format!("argument {} has no discovered name", idx + 1)));
            }
            if inputs
                .insert(arg.name.clone(), InputParam::required(&arg.arg_type))
                .is_some()
            {
                return Err(omit(format!("argument {} is declared twice", arg.name)));
            }
        }

        let returns = function
            .returns
            .as_deref()
            .map(|r| format!("returns {}", r))
            .unwrap_or_else(|| "return type not discovered".to_string());
        let mut caveats = Vec::new();
        if let Some(role) = &function.required_role {
            caveats.push(format!("callable by role {}", role));
        }
        if let Some(volatility) = &function.volatility {
            if volatility.eq_ignore_ascii_case("volatile") {
                caveats.push("volatile function; calls may modify data".to_string());
            }
        }

        let overloaded = self
            .snapshot
            .function_overloads(&function.schema, &function.name)
            .nth(1)
            .is_some();
        let arg_names: Vec<&str> = function.args.iter().map(|a| a.name.as_str()).collect();
        let base = rpc_tool_name(
            &function.schema,
            &function.name,
            overloaded.then_some(arg_names.as_slice()),
        );

        Ok(ToolDescriptor {
            name: names.claim(base),
            description: format!("Call {} ({})", resource, returns),
            operation: Operation::Rpc,
            resource: ResourceRef::function(&function.schema, &function.name),
            inputs,
            filters: Vec::new(),
            select: Vec::new(),
            available: Vec::new(),
            order: None,
            pagination: None,
            relationships: Vec::new(),
            requires_service_role: function.required_role.as_deref() == Some("service_role"),
            caveats,
        })
    }
}

/// Service-role flag and caveats for an operation on `table`.
///
/// RLS disabled: service role required, no caveats. RLS enabled: caveats
/// name every governing policy, or say that none matched.
fn security(table: &Table, op: Operation, commands: &[PolicyCommand]) -> (bool, Vec<String>) {
    if !table.rls_enabled {
        return (true, Vec::new());
    }
    let governing = table.policies_for(commands);
    if governing.is_empty() {
        (
            false,
            vec![format!(
                "no matching {} policy found on {}",
                op.as_str().to_uppercase(),
                table.qualified_name()
            )],
        )
    } else {
        (false, governing.iter().map(|p| p.name.clone()).collect())
    }
}

fn key_inputs(table: &Table) -> BTreeMap<String, InputParam> {
    table
        .primary_key_names()
        .iter()
        .filter_map(|pk| table.column(pk))
        .map(|c| (c.name.clone(), InputParam::required(&c.data_type)))
        .collect()
}

fn key_filters(table: &Table) -> Vec<Filter> {
    table
        .primary_key_names()
        .iter()
        .map(|pk| Filter {
            column: pk.clone(),
            op: FilterOp::Eq,
        })
        .collect()
}

fn sensitive_key(table: &Table, op: Operation, allow_sensitive: bool) -> Option<Skipped> {
    if allow_sensitive {
        return None;
    }
    table
        .primary_key_names()
        .iter()
        .filter_map(|pk| table.column(pk))
        .find(|c| c.sensitive)
        .map(|c| {
            unsafe_op(
                table,
                op,
                format!("primary key column {} is sensitive", c.name),
            )
        })
}

fn omission(table: &Table, op: Operation, reason: &str) -> Skipped {
    Skipped {
        resource: table.qualified_name().to_string(),
        operation: op,
        kind: SkipKind::Omitted,
        reason: reason.to_string(),
    }
}

fn unsafe_op(table: &Table, op: Operation, reason: String) -> Skipped {
    let err = ForgeError::UnsafeOperationRejected {
        resource: table.qualified_name().to_string(),
        operation: op.to_string(),
        reason,
    };
    Skipped {
        resource: table.qualified_name().to_string(),
        operation: op,
        kind: SkipKind::Unsafe,
        reason: err.to_string(),
    }
}
