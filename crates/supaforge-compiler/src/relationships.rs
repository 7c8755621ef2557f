//! Nested-select relationships derived from discovered foreign keys.
//!
//! Three shapes are emitted, all backed by foreign keys present in the
//! snapshot:
//!
//! | Shape | Source |
//! |-------|--------|
//! | outbound (many-to-one) | a foreign key declared on the table |
//! | inbound (one-to-many) | a foreign key on another table referencing this one |
//! | through a join table | a discovered table whose two foreign keys reference this table and another |
//!
//! Nothing is inferred from column names.

use supaforge_core::{DiscoverySnapshot, ForeignKey, Relationship, Table};

/// All relationships for `table`, outbound first, then inbound, then joins.
pub fn derive(snapshot: &DiscoverySnapshot, table: &Table) -> Vec<Relationship> {
    let mut out = Vec::new();

    for fk in &table.foreign_keys {
        let target = table.referenced_table(fk);
        out.push(Relationship {
            constraint: fk.constraint.clone(),
            from_columns: fk.columns.clone(),
            to_schema: target.schema,
            to_table: target.name,
            to_columns: fk.ref_columns.clone(),
            via: None,
        });
    }

    let inbound = snapshot.inbound_foreign_keys(table);

    for (owner, fk) in &inbound {
        out.push(Relationship {
            constraint: fk.constraint.clone(),
            from_columns: fk.ref_columns.clone(),
            to_schema: owner.schema.clone(),
            to_table: owner.name.clone(),
            to_columns: fk.columns.clone(),
            via: None,
        });
    }

    for (join, fk_here) in &inbound {
        if join.qualified_name() == table.qualified_name() {
            continue;
        }
        let Some(fk_other) = other_join_key(join, fk_here) else {
            continue;
        };
        let target = join.referenced_table(fk_other);
        out.push(Relationship {
            constraint: fk_other.constraint.clone(),
            from_columns: fk_here.ref_columns.clone(),
            to_schema: target.schema,
            to_table: target.name,
            to_columns: fk_other.ref_columns.clone(),
            via: Some(join.qualified_name().to_string()),
        });
    }

    out
}

/// The second foreign key of a join table: one with exactly two foreign
/// keys, both discovered.
fn other_join_key<'a>(join: &'a Table, fk_here: &ForeignKey) -> Option<&'a ForeignKey> {
    if join.foreign_keys.len() != 2 {
        return None;
    }
    join.foreign_keys
        .iter()
        .find(|fk| fk.constraint != fk_here.constraint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use supaforge_core::DiscoveryDocument;

    fn snapshot() -> DiscoverySnapshot {
        let doc: DiscoveryDocument = serde_json::from_value(json!({
            "tables": [
                {"schema": "public", "name": "posts",
                 "columns": [{"name": "id", "type": "bigint"}],
                 "primary_key": ["id"]},
                {"schema": "public", "name": "tags",
                 "columns": [{"name": "id", "type": "bigint"}],
                 "primary_key": ["id"]},
                {"schema": "public", "name": "post_tags",
                 "columns": [
                     {"name": "post_id", "type": "bigint"},
                     {"name": "tag_id", "type": "bigint"}
                 ],
                 "primary_key": ["post_id", "tag_id"],
                 "foreign_keys": [
                     {"constraint": "post_tags_post_id_fkey", "columns": ["post_id"],
                      "ref_table": "posts", "ref_columns": ["id"]},
                     {"constraint": "post_tags_tag_id_fkey", "columns": ["tag_id"],
                      "ref_table": "tags", "ref_columns": ["id"]}
                 ]}
            ]
        }))
        .unwrap();
        DiscoverySnapshot::try_from_document(doc).unwrap()
    }

    #[test]
    fn test_join_table_yields_many_to_many() {
        let snapshot = snapshot();
        let posts = snapshot.table("public", "posts").unwrap();
        let rels = derive(&snapshot, posts);

        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].to_table, "post_tags");
        assert_eq!(rels[0].via, None);
        assert_eq!(rels[1].to_table, "tags");
        assert_eq!(rels[1].via.as_deref(), Some("public.post_tags"));
        assert_eq!(rels[1].constraint, "post_tags_tag_id_fkey");
    }

    #[test]
    fn test_join_table_has_only_outbound() {
        let snapshot = snapshot();
        let join = snapshot.table("public", "post_tags").unwrap();
        let rels = derive(&snapshot, join);
        assert_eq!(rels.len(), 2);
        assert!(rels.iter().all(|r| r.via.is_none()));
    }

    #[test]
    fn test_no_relationship_without_foreign_key() {
        let doc: DiscoveryDocument = serde_json::from_value(json!({
            "tables": [
                {"schema": "public", "name": "users",
                 "columns": [{"name": "id", "type": "uuid"}]},
                {"schema": "public", "name": "profiles",
                 "columns": [{"name": "user_id", "type": "uuid"}]}
            ]
        }))
        .unwrap();
        let snapshot = DiscoverySnapshot::try_from_document(doc).unwrap();
        for table in snapshot.tables() {
            assert!(derive(&snapshot, table).is_empty());
        }
    }
}
