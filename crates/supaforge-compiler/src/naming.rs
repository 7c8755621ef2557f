//! Tool naming helpers.

use std::collections::BTreeSet;

/// Base name for a table-scoped tool: `list_orders`, `update_order_total`.
///
/// Tables outside `public` carry their schema so names stay unique across
/// schemas.
pub fn table_tool_name(verb: &str, schema: &str, table: &str, suffix: Option<&str>) -> String {
    let subject = match verb {
        "list" => sanitize(table),
        _ => singularize(&sanitize(table)),
    };
    let mut name = if schema == "public" {
        format!("{}_{}", verb, subject)
    } else {
        format!("{}_{}_{}", verb, sanitize(schema), subject)
    };
    if let Some(suffix) = suffix {
        name.push('_');
        name.push_str(&sanitize(suffix));
    }
    name
}

/// Base name for an RPC tool.
///
/// An overloaded function carries its argument names (`rpc_search_by_q`),
/// or `_no_args` for the overload without any, so each overload gets a
/// stable name of its own.
pub fn rpc_tool_name(schema: &str, function: &str, overload_args: Option<&[&str]>) -> String {
    let mut name = if schema == "public" {
        format!("rpc_{}", sanitize(function))
    } else {
        format!("rpc_{}_{}", sanitize(schema), sanitize(function))
    };
    match overload_args {
        Some([]) => name.push_str("_no_args"),
        Some(args) => {
            name.push_str("_by");
            for arg in args {
                name.push('_');
                name.push_str(&sanitize(arg));
            }
        }
        None => {}
    }
    name
}

/// Hands out unique names, suffixing `_2`, `_3`, ... on collision.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: BTreeSet<String>,
}

impl NameRegistry {
    pub fn claim(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Lowercase, with anything outside `[a-z0-9_]` folded to `_`.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Simple singularization (converts plural to singular).
fn singularize(s: &str) -> String {
    let irregulars = [
        ("people", "person"),
        ("children", "child"),
        ("men", "man"),
        ("women", "woman"),
        ("mice", "mouse"),
    ];

    for (plural, singular) in irregulars {
        if s == plural {
            return singular.to_string();
        }
    }

    // categories -> category
    if s.ends_with("ies") && s.len() > 3 {
        return format!("{}y", &s[..s.len() - 3]);
    }

    // boxes -> box, but not statuses -> status (handled by the 'us' rule below)
    if s.ends_with("xes") || s.ends_with("ches") || s.ends_with("shes") || s.ends_with("sses") {
        return s[..s.len() - 2].to_string();
    }

    if s.ends_with('s') && !s.ends_with("ss") && !s.ends_with("us") && !s.ends_with("is") {
        return s[..s.len() - 1].to_string();
    }

    s.to_string()
}
