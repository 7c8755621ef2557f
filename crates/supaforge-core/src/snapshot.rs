//! Discovery snapshot: the typed schema model.
//!
//! Discovery providers hand over a [`DiscoveryDocument`] (the JSON wire
//! shape). It becomes a [`DiscoverySnapshot`] through one of two
//! constructors:
//!
//! - [`DiscoverySnapshot::try_from_document`] rejects any invariant
//!   violation with [`ForgeError::MalformedDiscovery`].
//! - [`DiscoverySnapshot::from_document_lenient`] drops the offending
//!   foreign key, primary key, index or duplicate table and records each
//!   drop as a [`Limitation`].
//!
//! Snapshots are immutable once built; a new discovery run replaces them.

use crate::error::ForgeError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Tool name used for limitations raised by snapshot validation.
pub const SNAPSHOT_LIMITATION_TOOL: &str = "snapshot";

// =============================================================================
// Wire document
// =============================================================================

/// Raw discovery output as produced by a discovery provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub edge_functions: Vec<EdgeFunction>,
    #[serde(default)]
    pub db_functions: Vec<DbFunction>,
    #[serde(default)]
    pub tables: Vec<TableDocument>,
    #[serde(default)]
    pub extensions: Vec<Extension>,
    #[serde(default)]
    pub limitations: Vec<Limitation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDocument {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDocument>,
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub unique_indexes: Vec<UniqueIndex>,
    #[serde(default)]
    pub rls_enabled: bool,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

// =============================================================================
// Model types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFunction {
    pub name: String,
    #[serde(default = "default_edge_status")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Partial-failure record: which discovery tool failed and its error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limitation {
    pub tool: String,
    pub error: String,
}

impl Limitation {
    pub fn new(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArg {
    /// Empty when the function declares an unnamed argument.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: String,
}

/// Discovered database function callable over RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbFunction {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub args: Vec<FunctionArg>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub volatility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_role: Option<String>,
}

impl DbFunction {
    pub fn arg_types(&self) -> Vec<&str> {
        self.args.iter().map(|a| a.arg_type.as_str()).collect()
    }

    /// `schema.name(type, ...)`, which tells overloads apart.
    pub fn signature(&self) -> String {
        format!("{}.{}({})", self.schema, self.name, self.arg_types().join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constraint: String,
    pub columns: Vec<String>,
    /// Schema of the referenced table; the owning table's schema when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_schema: Option<String>,
    pub ref_table: String,
    #[serde(default)]
    pub ref_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueIndex {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyCommand {
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCommand::All => "ALL",
            PolicyCommand::Select => "SELECT",
            PolicyCommand::Insert => "INSERT",
            PolicyCommand::Update => "UPDATE",
            PolicyCommand::Delete => "DELETE",
        }
    }
}

/// Row-level security policy, referenced only by its discovered metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub command: PolicyCommand,
    #[serde(default)]
    pub using: Option<String>,
    #[serde(default)]
    pub with_check: Option<String>,
}

/// `schema.name` pair identifying a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub sensitive: bool,
}

impl Column {
    /// Must be supplied on insert: not null and no server-side default.
    pub fn is_required_on_insert(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub unique_indexes: Vec<UniqueIndex>,
    pub rls_enabled: bool,
    pub policies: Vec<Policy>,
}

impl Table {
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(&self.schema, &self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary key column names; empty when the table has none.
    pub fn primary_key_names(&self) -> &[String] {
        self.primary_key.as_deref().unwrap_or(&[])
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key_names().is_empty()
    }

    pub fn is_primary_key_column(&self, name: &str) -> bool {
        self.primary_key_names().iter().any(|c| c == name)
    }

    pub fn sensitive_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.sensitive)
    }

    pub fn has_sensitive_columns(&self) -> bool {
        self.columns.iter().any(|c| c.sensitive)
    }

    /// Policies with exactly one of the given commands, in discovery order.
    pub fn policies_for(&self, commands: &[PolicyCommand]) -> Vec<&Policy> {
        self.policies
            .iter()
            .filter(|p| commands.contains(&p.command))
            .collect()
    }

    fn ref_schema<'a>(&'a self, fk: &'a ForeignKey) -> &'a str {
        fk.ref_schema.as_deref().unwrap_or(&self.schema)
    }

    /// Referenced table of a foreign key, qualified.
    pub fn referenced_table(&self, fk: &ForeignKey) -> QualifiedName {
        QualifiedName::new(self.ref_schema(fk), &fk.ref_table)
    }

    fn to_document(&self) -> TableDocument {
        TableDocument {
            schema: self.schema.clone(),
            name: self.name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnDocument {
                    name: c.name.clone(),
                    data_type: c.data_type.clone(),
                    nullable: c.nullable,
                    default: c.default.clone(),
                })
                .collect(),
            primary_key: self.primary_key.clone(),
            foreign_keys: self.foreign_keys.clone(),
            unique_indexes: self.unique_indexes.clone(),
            rls_enabled: self.rls_enabled,
            policies: self.policies.clone(),
            sensitive_columns: self.sensitive_columns().map(|c| c.name.clone()).collect(),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable, validated capture of a project's discoverable capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySnapshot {
    edge_functions: Vec<EdgeFunction>,
    functions: Vec<DbFunction>,
    tables: Vec<Table>,
    extensions: Vec<Extension>,
    limitations: Vec<Limitation>,
}

impl DiscoverySnapshot {
    /// Build a snapshot, failing on the first batch of invariant violations.
    pub fn try_from_document(doc: DiscoveryDocument) -> Result<Self, ForgeError> {
        let (snapshot, issues) = Self::build(doc);
        if issues.is_empty() {
            Ok(snapshot)
        } else {
            Err(ForgeError::MalformedDiscovery(issues.join("; ")))
        }
    }

    /// Build a snapshot, dropping whatever violates an invariant and
    /// recording each drop as a limitation.
    pub fn from_document_lenient(doc: DiscoveryDocument) -> Self {
        let (mut snapshot, issues) = Self::build(doc);
        snapshot.limitations.extend(
            issues
                .into_iter()
                .map(|issue| Limitation::new(SNAPSHOT_LIMITATION_TOOL, issue)),
        );
        snapshot
    }

    fn build(doc: DiscoveryDocument) -> (Self, Vec<String>) {
        let mut issues = Vec::new();

        // Pass 1: tables and their own columns.
        let mut seen = BTreeSet::new();
        let mut tables = Vec::with_capacity(doc.tables.len());
        for table_doc in doc.tables {
            let key = QualifiedName::new(&table_doc.schema, &table_doc.name);
            if !seen.insert(key.clone()) {
                issues.push(format!("duplicate table {}; later occurrence dropped", key));
                continue;
            }
            tables.push(build_table(table_doc, &mut issues));
        }

        // Pass 2: foreign keys need the complete table set.
        let columns_by_table: BTreeMap<QualifiedName, BTreeSet<String>> = tables
            .iter()
            .map(|t| {
                (
                    t.qualified_name(),
                    t.columns.iter().map(|c| c.name.clone()).collect(),
                )
            })
            .collect();

        for table in &mut tables {
            let owner = table.qualified_name();
            let local: BTreeSet<String> = table.columns.iter().map(|c| c.name.clone()).collect();
            let schema = table.schema.clone();
            table.foreign_keys.retain(|fk| {
                match foreign_key_problem(fk, &schema, &local, &columns_by_table) {
                    Some(problem) => {
                        issues.push(format!(
                            "foreign key {} on {} dropped: {}",
                            fk.constraint, owner, problem
                        ));
                        false
                    }
                    None => true,
                }
            });
        }

        let mut functions = Vec::with_capacity(doc.db_functions.len());
        let mut signatures = BTreeSet::new();
        for function in doc.db_functions {
            if function.name.trim().is_empty() || function.schema.trim().is_empty() {
                issues.push("function without schema or name dropped".to_string());
                continue;
            }
            let signature = function.signature();
            if !signatures.insert(signature.clone()) {
                issues.push(format!("duplicate function {}; later occurrence dropped", signature));
                continue;
            }
            functions.push(function);
        }

        let snapshot = Self {
            edge_functions: doc.edge_functions,
            functions,
            tables,
            extensions: doc.extensions,
            limitations: doc.limitations,
        };
        (snapshot, issues)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn functions(&self) -> &[DbFunction] {
        &self.functions
    }

    pub fn edge_functions(&self) -> &[EdgeFunction] {
        &self.edge_functions
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn limitations(&self) -> &[Limitation] {
        &self.limitations
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == name)
    }

    /// Every overload of `schema.name`, in discovery order.
    pub fn function_overloads<'a, 's>(
        &'a self,
        schema: &'s str,
        name: &'s str,
    ) -> impl Iterator<Item = &'a DbFunction> + 's
    where
        'a: 's,
    {
        self.functions
            .iter()
            .filter(move |f| f.schema == schema && f.name == name)
    }

    /// The overload of `schema.name` whose argument types are `arg_types`.
    pub fn function(&self, schema: &str, name: &str, arg_types: &[&str]) -> Option<&DbFunction> {
        self.function_overloads(schema, name)
            .find(|f| f.arg_types() == arg_types)
    }

    /// Foreign keys elsewhere in the snapshot that reference `target`.
    pub fn inbound_foreign_keys(&self, target: &Table) -> Vec<(&Table, &ForeignKey)> {
        let target_name = target.qualified_name();
        self.tables
            .iter()
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
            .filter(|(owner, fk)| owner.referenced_table(fk) == target_name)
            .collect()
    }

    /// Number of inbound plus outbound foreign keys.
    pub fn fk_degree(&self, table: &Table) -> usize {
        table.foreign_keys.len() + self.inbound_foreign_keys(table).len()
    }

    /// Wire form of the snapshot, suitable for the discovery output block.
    pub fn to_document(&self) -> DiscoveryDocument {
        DiscoveryDocument {
            edge_functions: self.edge_functions.clone(),
            db_functions: self.functions.clone(),
            tables: self.tables.iter().map(Table::to_document).collect(),
            extensions: self.extensions.clone(),
            limitations: self.limitations.clone(),
        }
    }
}

fn build_table(doc: TableDocument, issues: &mut Vec<String>) -> Table {
    let qualified = QualifiedName::new(&doc.schema, &doc.name);

    let sensitive: BTreeSet<&str> = doc.sensitive_columns.iter().map(|s| s.as_str()).collect();
    let mut names = BTreeSet::new();
    let mut columns = Vec::with_capacity(doc.columns.len());
    for col in &doc.columns {
        if !names.insert(col.name.clone()) {
            issues.push(format!(
                "duplicate column {} on {}; later occurrence dropped",
                col.name, qualified
            ));
            continue;
        }
        columns.push(Column {
            name: col.name.clone(),
            data_type: col.data_type.clone(),
            nullable: col.nullable,
            default: col.default.clone(),
            sensitive: sensitive.contains(col.name.as_str()),
        });
    }

    for name in &sensitive {
        if !names.contains(*name) {
            issues.push(format!(
                "sensitive column {} is not a column of {}; ignored",
                name, qualified
            ));
        }
    }

    let primary_key = match doc.primary_key {
        Some(pk) if pk.is_empty() => None,
        Some(pk) => {
            let missing = pk.iter().find(|c| !names.contains(*c)).cloned();
            match missing {
                Some(missing) => {
                    issues.push(format!(
                        "primary key of {} references missing column {}; primary key dropped",
                        qualified, missing
                    ));
                    None
                }
                None => Some(pk),
            }
        }
        None => None,
    };

    let unique_indexes = doc
        .unique_indexes
        .into_iter()
        .filter(|idx| match idx.columns.iter().find(|c| !names.contains(*c)) {
            Some(missing) => {
                issues.push(format!(
                    "unique index {} on {} references missing column {}; index dropped",
                    idx.name, qualified, missing
                ));
                false
            }
            None => true,
        })
        .collect();

    Table {
        schema: doc.schema,
        name: doc.name,
        columns,
        primary_key,
        foreign_keys: doc.foreign_keys,
        unique_indexes,
        rls_enabled: doc.rls_enabled,
        policies: doc.policies,
    }
}

fn foreign_key_problem(
    fk: &ForeignKey,
    owner_schema: &str,
    local: &BTreeSet<String>,
    tables: &BTreeMap<QualifiedName, BTreeSet<String>>,
) -> Option<String> {
    if fk.columns.is_empty() || fk.ref_columns.is_empty() {
        return Some("constraint columns were not discovered".to_string());
    }
    if fk.columns.len() != fk.ref_columns.len() {
        return Some("local and referenced column counts differ".to_string());
    }
    if let Some(missing) = fk.columns.iter().find(|c| !local.contains(*c)) {
        return Some(format!("local column {} not discovered", missing));
    }
    let target = QualifiedName::new(
        fk.ref_schema.as_deref().unwrap_or(owner_schema),
        &fk.ref_table,
    );
    let Some(target_columns) = tables.get(&target) else {
        return Some(format!("referenced table {} not discovered", target));
    };
    if let Some(missing) = fk.ref_columns.iter().find(|c| !target_columns.contains(*c)) {
        return Some(format!(
            "referenced column {}.{} not discovered",
            target, missing
        ));
    }
    None
}

fn default_nullable() -> bool {
    true
}

fn default_edge_status() -> String {
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> DiscoveryDocument {
        serde_json::from_value(value).unwrap()
    }

    fn orders_and_customers() -> serde_json::Value {
        json!({
            "tables": [
                {
                    "schema": "public",
                    "name": "customers",
                    "columns": [
                        {"name": "id", "type": "bigint", "nullable": false},
                        {"name": "email", "type": "text", "nullable": false}
                    ],
                    "primary_key": ["id"],
                    "rls_enabled": true,
                    "sensitive_columns": ["email"]
                },
                {
                    "schema": "public",
                    "name": "orders",
                    "columns": [
                        {"name": "id", "type": "bigint", "nullable": false},
                        {"name": "customer_id", "type": "bigint", "nullable": false}
                    ],
                    "primary_key": ["id"],
                    "foreign_keys": [{
                        "constraint": "orders_customer_id_fkey",
                        "columns": ["customer_id"],
                        "ref_table": "customers",
                        "ref_columns": ["id"]
                    }]
                }
            ]
        })
    }

    #[test]
    fn test_valid_document_builds() {
        let snapshot = DiscoverySnapshot::try_from_document(doc(orders_and_customers())).unwrap();
        let customers = snapshot.table("public", "customers").unwrap();
        assert!(customers.column("email").unwrap().sensitive);
        assert!(!customers.column("id").unwrap().sensitive);
        assert_eq!(snapshot.fk_degree(customers), 1);
        let orders = snapshot.table("public", "orders").unwrap();
        assert_eq!(snapshot.fk_degree(orders), 1);
        assert_eq!(
            orders.referenced_table(&orders.foreign_keys[0]),
            QualifiedName::new("public", "customers")
        );
    }

    #[test]
    fn test_foreign_key_to_unknown_table_is_malformed() {
        let mut value = orders_and_customers();
        value["tables"][1]["foreign_keys"][0]["ref_table"] = json!("accounts");
        let err = DiscoverySnapshot::try_from_document(doc(value.clone())).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedDiscovery(ref m) if m.contains("public.accounts")));

        let lenient = DiscoverySnapshot::from_document_lenient(doc(value));
        assert!(lenient.table("public", "orders").unwrap().foreign_keys.is_empty());
        assert_eq!(lenient.limitations().len(), 1);
        assert_eq!(lenient.limitations()[0].tool, SNAPSHOT_LIMITATION_TOOL);
    }

    #[test]
    fn test_primary_key_on_missing_column_is_malformed() {
        let mut value = orders_and_customers();
        value["tables"][0]["primary_key"] = json!(["uuid"]);
        assert!(DiscoverySnapshot::try_from_document(doc(value.clone())).is_err());

        let lenient = DiscoverySnapshot::from_document_lenient(doc(value));
        assert!(!lenient.table("public", "customers").unwrap().has_primary_key());
    }

    #[test]
    fn test_duplicate_table_is_malformed() {
        let mut value = orders_and_customers();
        let copy = value["tables"][0].clone();
        value["tables"].as_array_mut().unwrap().push(copy);
        let err = DiscoverySnapshot::try_from_document(doc(value.clone())).unwrap_err();
        assert!(err.to_string().contains("duplicate table public.customers"));

        let lenient = DiscoverySnapshot::from_document_lenient(doc(value));
        assert_eq!(lenient.tables().len(), 2);
    }

    #[test]
    fn test_same_name_in_other_schema_is_not_duplicate() {
        let mut value = orders_and_customers();
        let mut copy = value["tables"][0].clone();
        copy["schema"] = json!("billing");
        value["tables"].as_array_mut().unwrap().push(copy);
        let snapshot = DiscoverySnapshot::try_from_document(doc(value)).unwrap();
        assert_eq!(snapshot.tables().len(), 3);
    }

    #[test]
    fn test_document_round_trip_preserves_sensitive_columns() {
        let original = doc(orders_and_customers());
        let snapshot = DiscoverySnapshot::try_from_document(original.clone()).unwrap();
        let back = snapshot.to_document();
        assert_eq!(back.tables[0].sensitive_columns, vec!["email".to_string()]);
        assert_eq!(back.tables[1].foreign_keys, original.tables[1].foreign_keys);
    }

    #[test]
    fn test_function_lookup_matches_argument_types() {
        let value = json!({
            "tables": [],
            "db_functions": [
                {"schema": "public", "name": "search", "args": [{"name": "q", "type": "text"}]},
                {"schema": "public", "name": "search", "args": [{"name": "tag_id", "type": "bigint"}]}
            ]
        });
        let snapshot = DiscoverySnapshot::try_from_document(doc(value)).unwrap();
        assert_eq!(snapshot.function_overloads("public", "search").count(), 2);

        let by_tag = snapshot.function("public", "search", &["bigint"]).unwrap();
        assert_eq!(by_tag.args[0].name, "tag_id");
        assert_eq!(by_tag.signature(), "public.search(bigint)");
        assert!(snapshot.function("public", "search", &[]).is_none());
    }

    #[test]
    fn test_duplicate_function_signature_is_malformed() {
        let value = json!({
            "tables": [],
            "db_functions": [
                {"schema": "public", "name": "search", "args": [{"name": "q", "type": "text"}]},
                {"schema": "public", "name": "search", "args": [{"name": "term", "type": "text"}]}
            ]
        });
        let err = DiscoverySnapshot::try_from_document(doc(value)).unwrap_err();
        assert!(err.to_string().contains("duplicate function public.search(text)"));
    }

    #[test]
    fn test_existing_limitations_are_carried() {
        let value = json!({
            "tables": [],
            "limitations": [{"tool": "list_edge_functions", "error": "403 Forbidden"}]
        });
        let snapshot = DiscoverySnapshot::try_from_document(doc(value)).unwrap();
        assert_eq!(
            snapshot.limitations(),
            &[Limitation::new("list_edge_functions", "403 Forbidden")]
        );
    }
}
