//! Typed SQL statements.
//!
//! Statements carry positional parameters (`$1`, `$2`, ...) so executors
//! can bind values instead of splicing them. [`Statement::inline`] renders
//! a literal form for operators who run the SQL by hand.

use crate::target::quote_literal;
use serde::{Deserialize, Serialize};

/// What a statement does to the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementKind {
    CreateTable,
    CreateIndex { name: String },
    EnableRls,
    CreatePolicy { name: String },
    /// Transaction-scoped advisory lock serializing inserts per email.
    AdvisoryLock { email: String },
    DeactivateActive { email: String },
    InsertNextVersion { email: String },
}

impl StatementKind {
    /// Short description for logs and execution errors.
    pub fn label(&self) -> String {
        match self {
            StatementKind::CreateTable => "create table".to_string(),
            StatementKind::CreateIndex { name } => format!("create index {}", name),
            StatementKind::EnableRls => "enable row level security".to_string(),
            StatementKind::CreatePolicy { name } => format!("create policy {}", name),
            StatementKind::AdvisoryLock { .. } => "advisory lock".to_string(),
            StatementKind::DeactivateActive { .. } => "deactivate active version".to_string(),
            StatementKind::InsertNextVersion { .. } => "insert next version".to_string(),
        }
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Json(serde_json::Value),
    Null,
}

impl SqlParam {
    fn literal(&self) -> String {
        match self {
            SqlParam::Text(s) => quote_literal(s),
            SqlParam::Json(v) => quote_literal(&v.to_string()),
            SqlParam::Null => "NULL".to_string(),
        }
    }
}

impl From<Option<String>> for SqlParam {
    fn from(value: Option<String>) -> Self {
        value.map(SqlParam::Text).unwrap_or(SqlParam::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    /// SQL text with `$n` placeholders, no trailing semicolon.
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<SqlParam>) -> Self {
        self.params = params;
        self
    }

    /// SQL with every placeholder replaced by a quoted literal.
    ///
    /// Single pass, so placeholder-like text inside a substituted value is
    /// left alone. `$$` quoting is passed through.
    pub fn inline(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut chars = self.sql.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            let param = digits
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| self.params.get(idx));
            match param {
                Some(param) => out.push_str(&param.literal()),
                None => {
                    out.push('$');
                    out.push_str(&digits);
                }
            }
        }
        out
    }
}

/// Statements meant to run together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementSet {
    pub statements: Vec<Statement>,
    /// The executor must run the whole set inside one transaction.
    pub transactional: bool,
}

impl StatementSet {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &StatementKind> {
        self.statements.iter().map(|s| &s.kind)
    }

    /// Runnable script with literals inlined. Transactional sets are
    /// wrapped in `BEGIN`/`COMMIT`.
    pub fn render(&self) -> String {
        let mut out: Vec<String> = Vec::with_capacity(self.statements.len() + 2);
        if self.transactional && !self.statements.is_empty() {
            out.push("BEGIN;".to_string());
        }
        for stmt in &self.statements {
            out.push(format!("{};", stmt.inline()));
        }
        if self.transactional && !self.statements.is_empty() {
            out.push("COMMIT;".to_string());
        }
        out.join("\n\n")
    }
}
