//! Versioned configuration inserts.

use crate::setup::ProvisionState;
use crate::statement::{SqlParam, Statement, StatementKind, StatementSet};
use crate::target::ConfigTarget;
use supaforge_core::{ForgeError, ToolsDocument};

/// Evidence about the setup step, required before an insert is planned.
///
/// Only [`SetupOutcome::observe`] can yield a verified outcome, and only
/// when the observed target carries every setup object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    verified: bool,
    reason: Option<String>,
}

impl SetupOutcome {
    pub fn observe(state: &ProvisionState) -> Self {
        let missing = state.missing();
        if missing.is_empty() {
            Self {
                verified: true,
                reason: None,
            }
        } else {
            Self {
                verified: false,
                reason: Some(format!("setup incomplete, missing: {}", missing.join(", "))),
            }
        }
    }

    /// Setup execution failed with `error`.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            reason: Some(format!("setup failed: {}", error.into())),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// A tool payload to store as the next active version for `email`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedInsert {
    pub email: String,
    pub project_name: Option<String>,
    pub tools: ToolsDocument,
}

/// Plan the deactivate-then-insert unit for `insert`.
///
/// The set is transactional and opens with
/// `pg_advisory_xact_lock(hashtext(email))`, so two sessions inserting for
/// the same email serialize; the partial unique index on active rows backs
/// this up at the storage level. The new version is computed in SQL from
/// the rows present at execution time.
pub fn plan_versioned_insert(
    setup: &SetupOutcome,
    insert: &VersionedInsert,
) -> Result<StatementSet, ForgeError> {
    if !setup.is_verified() {
        let reason = setup
            .reason()
            .unwrap_or("setup has not completed")
            .to_string();
        tracing::warn!(reason = %reason, "Versioned insert blocked");
        return Err(ForgeError::ProvisioningBlocked(reason));
    }

    let email = insert.email.trim();
    if email.is_empty() {
        return Err(ForgeError::InputIncomplete(vec!["owner_email".to_string()]));
    }

    let tools = serde_json::to_value(&insert.tools).map_err(|e| {
        ForgeError::ProvisioningBlocked(format!("tools payload could not be serialized: {}", e))
    })?;

    let table = ConfigTarget::fixed().qualified_ident();
    let email_param = SqlParam::Text(email.to_string());

    let statements = vec![
        Statement::new(
            StatementKind::AdvisoryLock {
                email: email.to_string(),
            },
            "SELECT pg_advisory_xact_lock(hashtext($1))",
        )
        .with_params(vec![email_param.clone()]),
        Statement::new(
            StatementKind::DeactivateActive {
                email: email.to_string(),
            },
            format!(
                "UPDATE {} SET is_active = false, updated_at = now() WHERE email = $1 AND is_active",
                table
            ),
        )
        .with_params(vec![email_param.clone()]),
        Statement::new(
            StatementKind::InsertNextVersion {
                email: email.to_string(),
            },
            format!(
                "INSERT INTO {table} (email, project_name, version, tools, is_active)\n\
                 SELECT $1, $2, COALESCE(MAX(version), 0) + 1, $3::jsonb, true\n\
                 FROM {table} WHERE email = $1",
                table = table
            ),
        )
        .with_params(vec![
            email_param,
            SqlParam::from(insert.project_name.clone()),
            SqlParam::Json(tools),
        ]),
    ];

    tracing::debug!(
        email = %email,
        tools = insert.tools.tools.len(),
        "Planned versioned configuration insert"
    );

    Ok(StatementSet {
        statements,
        transactional: true,
    })
}
