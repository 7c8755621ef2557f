//! Filter operators permitted per declared column type.

use supaforge_core::FilterOp;

const COMPARABLE: &[FilterOp] = &[
    FilterOp::Eq,
    FilterOp::Neq,
    FilterOp::Lt,
    FilterOp::Lte,
    FilterOp::Gt,
    FilterOp::Gte,
    FilterOp::In,
    FilterOp::Is,
];

const TEXT: &[FilterOp] = &[
    FilterOp::Eq,
    FilterOp::Neq,
    FilterOp::Like,
    FilterOp::Ilike,
    FilterOp::In,
    FilterOp::Is,
];

const CONTAINER: &[FilterOp] = &[FilterOp::Contains, FilterOp::ContainedBy, FilterOp::Is];

const BOOLEAN: &[FilterOp] = &[FilterOp::Eq, FilterOp::Neq, FilterOp::Is];

const EQUALITY: &[FilterOp] = &[FilterOp::Eq, FilterOp::Neq, FilterOp::In, FilterOp::Is];

/// Operators for a column of the given SQL type. Empty for types that
/// have no meaningful filter (binary, full-text vectors, geometry).
pub fn operators_for(data_type: &str) -> &'static [FilterOp] {
    let dt = data_type.trim().to_lowercase();

    if dt.ends_with("[]") || dt.starts_with('_') || dt == "array" {
        CONTAINER
    } else if dt.contains("json") || dt.contains("range") || dt == "hstore" {
        CONTAINER
    } else if dt.contains("bool") {
        BOOLEAN
    } else if dt.contains("int")
        || dt.contains("serial")
        || dt.contains("numeric")
        || dt.contains("decimal")
        || dt.contains("float")
        || dt.contains("double")
        || dt.contains("real")
        || dt.contains("money")
        || dt.contains("date")
        || dt.contains("time")
    {
        COMPARABLE
    } else if dt.contains("char") || dt == "text" || dt == "citext" || dt == "name" {
        TEXT
    } else if dt.contains("bytea") || dt.contains("tsvector") || dt.contains("geometry") {
        &[]
    } else {
        // uuid, enums and other user-defined scalars
        EQUALITY
    }
}
