//! Tool descriptor wire types.
//!
//! A [`ToolDescriptor`] is the declarative description of one permitted
//! read, write or RPC operation. Field names here are a stable wire
//! contract consumed by downstream MCP servers, so every type round-trips
//! through `serde_json` without loss.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Operation category of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Rpc,
}

impl Operation {
    /// All categories in canonical order.
    pub const ALL: [Operation; 5] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
        Operation::Rpc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Rpc => "rpc",
        }
    }

    /// Whether the operation mutates table rows.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Insert | Operation::Update | Operation::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "select" | "read" => Ok(Operation::Select),
            "insert" | "create" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "rpc" | "function" => Ok(Operation::Rpc),
            other => Err(format!(
                "unknown operation category '{}' (expected select, insert, update, delete or rpc)",
                other
            )),
        }
    }
}

/// The schema entity a descriptor acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl ResourceRef {
    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: Some(table.into()),
            function: None,
        }
    }

    pub fn function(schema: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: None,
            function: Some(function.into()),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.table, &self.function) {
            (Some(table), _) => write!(f, "{}.{}", self.schema, table),
            (None, Some(function)) => write!(f, "{}.{}()", self.schema, function),
            (None, None) => write!(f, "{}", self.schema),
        }
    }
}

/// One typed template variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParam {
    /// Declared type, copied from discovery.
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
}

impl InputParam {
    pub fn required(param_type: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            required: true,
        }
    }

    pub fn optional(param_type: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            required: false,
        }
    }
}

/// PostgREST-style filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    Ilike,
    In,
    Is,
    Contains,
    ContainedBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub by: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
    #[serde(default)]
    pub nulls: NullsOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Nested-select path derived from a discovered foreign key.
///
/// `via` names the discovered join table when the path crosses one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub constraint: String,
    pub from_columns: Vec<String>,
    pub to_schema: String,
    pub to_table: String,
    pub to_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

/// A compiled, safety-constrained tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub operation: Operation,
    pub resource: ResourceRef,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputParam>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Default selected columns.
    #[serde(default)]
    pub select: Vec<String>,
    /// Columns a caller may request beyond the default selection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub requires_service_role: bool,
    #[serde(default)]
    pub caveats: Vec<String>,
}

impl ToolDescriptor {
    /// Columns a write descriptor accepts as input or targets.
    /// Empty for reads and RPCs.
    pub fn written_columns(&self) -> Vec<&str> {
        if !self.operation.is_write() {
            return Vec::new();
        }
        let mut cols: Vec<&str> = self.inputs.keys().map(|k| k.as_str()).collect();
        for filter in &self.filters {
            if !cols.contains(&filter.column.as_str()) {
                cols.push(filter.column.as_str());
            }
        }
        cols
    }
}

/// The `{"tools": [...]}` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsDocument {
    pub tools: Vec<ToolDescriptor>,
}

fn default_ascending() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_op_wire_names() {
        assert_eq!(serde_json::to_value(FilterOp::ContainedBy).unwrap(), json!("containedBy"));
        assert_eq!(serde_json::to_value(FilterOp::Ilike).unwrap(), json!("ilike"));
        assert_eq!(serde_json::to_value(FilterOp::Neq).unwrap(), json!("neq"));
    }

    #[test]
    fn test_resource_ref_omits_absent_side() {
        let value = serde_json::to_value(ResourceRef::function("public", "search")).unwrap();
        assert_eq!(value, json!({"schema": "public", "function": "search"}));
    }

    #[test]
    fn test_descriptor_parses_minimal_document() {
        let doc: ToolsDocument = serde_json::from_value(json!({
            "tools": [{
                "name": "list_orders",
                "description": "List orders",
                "operation": "select",
                "resource": {"schema": "public", "table": "orders"},
                "order": {"by": "id"}
            }]
        }))
        .unwrap();
        let tool = &doc.tools[0];
        assert_eq!(tool.operation, Operation::Select);
        let order = tool.order.as_ref().unwrap();
        assert!(order.ascending);
        assert_eq!(order.nulls, NullsOrder::Auto);
        assert!(!tool.requires_service_role);
    }

    #[test]
    fn test_operation_from_str_accepts_aliases() {
        assert_eq!("READ".parse::<Operation>().unwrap(), Operation::Select);
        assert_eq!(" rpc ".parse::<Operation>().unwrap(), Operation::Rpc);
        assert!("truncate".parse::<Operation>().is_err());
    }
}
