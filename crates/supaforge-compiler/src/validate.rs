//! Final gate applied to every descriptor before it leaves the compiler.
//!
//! Each check mirrors a compiler rule so that a descriptor built by any
//! path (including a hand-edited one fed back in) is refused when it
//! references something discovery did not report, writes a sensitive
//! column without the override, or mutates by a missing primary key.

use supaforge_core::{DbFunction, DiscoverySnapshot, ForgeError, Operation, Table, ToolDescriptor};

/// Check `tool` against the snapshot it claims to be compiled from.
pub fn check_descriptor(
    tool: &ToolDescriptor,
    snapshot: &DiscoverySnapshot,
    allow_sensitive_writes: bool,
) -> Result<(), ForgeError> {
    let reject = |reason: String| ForgeError::UnsafeOperationRejected {
        resource: tool.resource.to_string(),
        operation: tool.operation.to_string(),
        reason,
    };

    if tool.operation == Operation::Rpc {
        let Some(name) = tool.resource.function.as_deref() else {
            return Err(reject("rpc descriptor without a function".to_string()));
        };
        let mut overloads = snapshot.function_overloads(&tool.resource.schema, name).peekable();
        if overloads.peek().is_none() {
            return Err(reject("function not present in discovery".to_string()));
        }
        let matches_inputs = |function: &DbFunction| {
            function.args.len() == tool.inputs.len()
                && function.args.iter().all(|a| {
                    tool.inputs
                        .get(&a.name)
                        .is_some_and(|p| p.param_type == a.arg_type)
                })
        };
        if !overloads.any(|f| matches_inputs(f)) {
            return Err(reject(
                "arguments match no discovered overload of the function".to_string(),
            ));
        }
        return Ok(());
    }

    let Some(table_name) = tool.resource.table.as_deref() else {
        return Err(reject("table descriptor without a table".to_string()));
    };
    let Some(table) = snapshot.table(&tool.resource.schema, table_name) else {
        return Err(reject("table not present in discovery".to_string()));
    };

    let referenced = tool
        .inputs
        .keys()
        .chain(tool.filters.iter().map(|f| &f.column))
        .chain(tool.select.iter())
        .chain(tool.available.iter())
        .chain(tool.order.iter().map(|o| &o.by));
    for column in referenced {
        if !table.has_column(column) {
            return Err(reject(format!("column {} not present in discovery", column)));
        }
    }

    for rel in &tool.relationships {
        check_relationship(rel, table, snapshot).map_err(&reject)?;
    }

    if matches!(tool.operation, Operation::Update | Operation::Delete) {
        if !table.has_primary_key() {
            return Err(reject("table has no primary key".to_string()));
        }
        let pk_filtered = table
            .primary_key_names()
            .iter()
            .all(|pk| tool.filters.iter().any(|f| &f.column == pk));
        if !pk_filtered {
            return Err(reject("mutation is not restricted by the full primary key".to_string()));
        }
    }

    if tool.operation.is_write() && !allow_sensitive_writes {
        if let Some(col) = tool
            .written_columns()
            .into_iter()
            .find(|c| table.column(c).is_some_and(|c| c.sensitive))
        {
            return Err(reject(format!("sensitive column {} in write set", col)));
        }
    }

    if !table.rls_enabled && !tool.requires_service_role {
        return Err(reject("RLS disabled but service role not required".to_string()));
    }

    Ok(())
}

fn check_relationship(
    rel: &supaforge_core::Relationship,
    table: &Table,
    snapshot: &DiscoverySnapshot,
) -> Result<(), String> {
    let Some(target) = snapshot.table(&rel.to_schema, &rel.to_table) else {
        return Err(format!(
            "relationship target {}.{} not present in discovery",
            rel.to_schema, rel.to_table
        ));
    };
    let constraint_known = snapshot
        .tables()
        .iter()
        .any(|t| t.foreign_keys.iter().any(|fk| fk.constraint == rel.constraint));
    if !constraint_known {
        return Err(format!(
            "relationship constraint {} not present in discovery",
            rel.constraint
        ));
    }
    if let Some(col) = rel.from_columns.iter().find(|c| !table.has_column(c)) {
        return Err(format!("relationship column {} not present in discovery", col));
    }
    if let Some(col) = rel.to_columns.iter().find(|c| !target.has_column(c)) {
        return Err(format!(
            "relationship column {}.{} not present in discovery",
            rel.to_table, col
        ));
    }
    if let Some(via) = &rel.via {
        let known = snapshot
            .tables()
            .iter()
            .any(|t| &t.qualified_name().to_string() == via);
        if !known {
            return Err(format!("join table {} not present in discovery", via));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use supaforge_core::{DiscoveryDocument, InputParam, ResourceRef};

    fn overloaded_search() -> DiscoverySnapshot {
        let doc: DiscoveryDocument = serde_json::from_value(json!({
            "db_functions": [
                {"schema": "public", "name": "search", "args": [{"name": "q", "type": "text"}]},
                {"schema": "public", "name": "search", "args": [{"name": "tag_id", "type": "bigint"}]}
            ]
        }))
        .unwrap();
        DiscoverySnapshot::try_from_document(doc).unwrap()
    }

    fn rpc(inputs: &[(&str, &str)]) -> ToolDescriptor {
        ToolDescriptor {
            name: "rpc_search_by_tag_id".to_string(),
            description: String::new(),
            operation: Operation::Rpc,
            resource: ResourceRef::function("public", "search"),
            inputs: inputs
                .iter()
                .map(|(name, ty)| (name.to_string(), InputParam::required(*ty)))
                .collect::<BTreeMap<_, _>>(),
            filters: Vec::new(),
            select: Vec::new(),
            available: Vec::new(),
            order: None,
            pagination: None,
            relationships: Vec::new(),
            requires_service_role: false,
            caveats: Vec::new(),
        }
    }

    #[test]
    fn test_rpc_checked_against_matching_overload() {
        let snapshot = overloaded_search();
        assert!(check_descriptor(&rpc(&[("q", "text")]), &snapshot, false).is_ok());
        assert!(check_descriptor(&rpc(&[("tag_id", "bigint")]), &snapshot, false).is_ok());

        let err = check_descriptor(&rpc(&[("tag_id", "text")]), &snapshot, false).unwrap_err();
        assert!(err.to_string().contains("no discovered overload"));
        assert!(check_descriptor(&rpc(&[]), &snapshot, false).is_err());
    }
}
