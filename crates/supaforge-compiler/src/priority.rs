//! Deterministic prioritization used when output exceeds the tool cap.
//!
//! Total order: table descriptors before RPC descriptors; within each
//! kind RLS-enabled first, then higher foreign-key degree, then name
//! ascending (schema breaks remaining ties).

use std::cmp::Ordering;
use supaforge_core::{DiscoverySnapshot, Table};

/// Ranked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    Table,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityKey {
    pub kind: ResourceKind,
    pub rls_enabled: bool,
    pub fk_degree: usize,
    pub name: String,
    pub schema: String,
}

impl PriorityKey {
    pub fn for_table(snapshot: &DiscoverySnapshot, table: &Table) -> Self {
        Self {
            kind: ResourceKind::Table,
            rls_enabled: table.rls_enabled,
            fk_degree: snapshot.fk_degree(table),
            name: table.name.clone(),
            schema: table.schema.clone(),
        }
    }

    pub fn for_function(schema: &str, name: &str) -> Self {
        Self {
            kind: ResourceKind::Function,
            rls_enabled: false,
            fk_degree: 0,
            name: name.to_string(),
            schema: schema.to_string(),
        }
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| other.rls_enabled.cmp(&self.rls_enabled))
            .then_with(|| other.fk_degree.cmp(&self.fk_degree))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.schema.cmp(&other.schema))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
