//! Operator inputs and the typed answers exchanged at prompt points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use supaforge_compiler::CompileOutput;
use supaforge_core::{Limitation, Operation};

/// Inputs the coordinator may have to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    ProjectRef,
    OwnerEmail,
    Categories,
}

impl InputField {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputField::ProjectRef => "project_ref",
            InputField::OwnerEmail => "owner_email",
            InputField::Categories => "categories",
        }
    }

    /// Declining a required field aborts the session.
    pub fn is_required(&self) -> bool {
        matches!(self, InputField::ProjectRef)
    }
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the operator supplied up front.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionInputs {
    pub project_ref: Option<String>,
    pub project_name: Option<String>,
    /// Full project URL; derived from `project_ref` when absent.
    pub project_url: Option<String>,
    /// Public anon key, only ever echoed into the MCP config block.
    pub anon_key: Option<String>,
    pub owner_email: Option<String>,
    pub categories: Option<BTreeSet<Operation>>,
    pub tables: Option<BTreeSet<String>>,
    pub allow_sensitive_writes: bool,
}

impl SessionInputs {
    /// Apply an operator answer. Blank strings count as not provided.
    pub(crate) fn merge(&mut self, values: InputValues) {
        if let Some(v) = non_blank(values.project_ref) {
            self.project_ref = Some(v);
        }
        if let Some(v) = non_blank(values.owner_email) {
            self.owner_email = Some(v);
        }
        if let Some(v) = values.categories {
            self.categories = Some(v);
        }
    }

    pub(crate) fn has(&self, field: InputField) -> bool {
        match field {
            InputField::ProjectRef => self.project_ref.is_some(),
            InputField::OwnerEmail => self.owner_email.is_some(),
            InputField::Categories => self.categories.is_some(),
        }
    }
}

impl fmt::Debug for SessionInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInputs")
            .field("project_ref", &self.project_ref)
            .field("project_name", &self.project_name)
            .field("project_url", &self.project_url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "<redacted>"))
            .field("owner_email", &self.owner_email)
            .field("categories", &self.categories)
            .field("tables", &self.tables)
            .field("allow_sensitive_writes", &self.allow_sensitive_writes)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Values returned from one `ask_missing` round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputValues {
    pub project_ref: Option<String>,
    pub owner_email: Option<String>,
    pub categories: Option<BTreeSet<Operation>>,
    /// Fields the operator explicitly declined to give.
    pub declined: BTreeSet<InputField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAnswer {
    Values(InputValues),
    Abort,
}

/// Compiled tools presented for acceptance.
#[derive(Debug, Clone, Copy)]
pub struct Review<'a> {
    pub project_ref: &'a str,
    pub categories: &'a BTreeSet<Operation>,
    pub output: &'a CompileOutput,
    pub limitations: &'a [Limitation],
    /// 1 for the first compilation, incremented per regeneration.
    pub round: u32,
}

/// What to do with the provisioning store after acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProvisionRequest {
    /// Run the statements; otherwise only return them.
    pub execute: bool,
    /// Also store the accepted tools as the next active version.
    pub insert_tools: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Accept { provision: Option<ProvisionRequest> },
    Regenerate { categories: BTreeSet<Operation> },
    Abort,
}
