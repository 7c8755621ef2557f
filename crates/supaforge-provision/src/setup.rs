//! Table, index and policy provisioning.

use crate::statement::{Statement, StatementKind, StatementSet};
use crate::target::{
    ConfigTarget, INDEX_ACTIVE_PER_EMAIL, INDEX_EMAIL, INDEX_EMAIL_VERSION, INDEX_IS_ACTIVE,
    INDEXES, POLICIES, POLICY_DEACTIVATE_OWN, POLICY_INSERT_OWN, POLICY_SELECT_OWN_ACTIVE,
    POLICY_UPDATE_OWN, quote_ident, quote_literal,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Provisioning objects observed on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionState {
    #[serde(default)]
    pub table_exists: bool,
    #[serde(default)]
    pub indexes: BTreeSet<String>,
    #[serde(default)]
    pub rls_enabled: bool,
    #[serde(default)]
    pub policies: BTreeSet<String>,
}

impl ProvisionState {
    /// Nothing provisioned yet.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Every object the setup plan creates.
    pub fn complete() -> Self {
        Self {
            table_exists: true,
            indexes: INDEXES.iter().map(|s| s.to_string()).collect(),
            rls_enabled: true,
            policies: POLICIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Names of objects the setup plan would still create.
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.table_exists {
            missing.push(ConfigTarget::fixed().display_name());
        }
        for index in INDEXES {
            if !self.indexes.contains(index) {
                missing.push(format!("index {}", index));
            }
        }
        if !self.rls_enabled {
            missing.push("row level security".to_string());
        }
        for policy in POLICIES {
            if !self.policies.contains(policy) {
                missing.push(format!("policy {}", policy));
            }
        }
        missing
    }

    /// Record the effect of successfully executed setup statements.
    /// Statements of other kinds leave the state unchanged.
    pub fn apply(&mut self, set: &StatementSet) {
        for kind in set.kinds() {
            match kind {
                StatementKind::CreateTable => self.table_exists = true,
                StatementKind::CreateIndex { name } => {
                    self.indexes.insert(name.clone());
                }
                StatementKind::EnableRls => self.rls_enabled = true,
                StatementKind::CreatePolicy { name } => {
                    self.policies.insert(name.clone());
                }
                StatementKind::AdvisoryLock { .. }
                | StatementKind::DeactivateActive { .. }
                | StatementKind::InsertNextVersion { .. } => {}
            }
        }
    }
}

/// Statements creating whatever `state` lacks, in dependency order.
///
/// Each statement is individually guarded (`IF NOT EXISTS` or a
/// `pg_policies` lookup), so running the plan against a target that moved
/// on since `state` was observed is still harmless. The set is not
/// transactional: an executor stops at the first failure and the next
/// plan picks up from the observed state.
pub fn plan_setup(state: &ProvisionState) -> StatementSet {
    let target = ConfigTarget::fixed();
    let table = target.qualified_ident();
    let mut statements = Vec::new();

    if !state.table_exists {
        statements.push(Statement::new(
            StatementKind::CreateTable,
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,\n    \
                 email text NOT NULL,\n    \
                 project_name text,\n    \
                 version integer NOT NULL DEFAULT 1,\n    \
                 tools jsonb NOT NULL,\n    \
                 is_active boolean NOT NULL DEFAULT true,\n    \
                 created_at timestamptz NOT NULL DEFAULT now(),\n    \
                 updated_at timestamptz NOT NULL DEFAULT now()\n)",
                table
            ),
        ));
    }

    for index in INDEXES {
        if state.indexes.contains(index) {
            continue;
        }
        let definition = match index {
            INDEX_EMAIL => "(email)",
            INDEX_IS_ACTIVE => "(is_active)",
            INDEX_ACTIVE_PER_EMAIL => "(email) WHERE is_active",
            INDEX_EMAIL_VERSION => "(email, version)",
            _ => continue,
        };
        let unique = if index.starts_with("uq_") { "UNIQUE " } else { "" };
        statements.push(Statement::new(
            StatementKind::CreateIndex {
                name: index.to_string(),
            },
            format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} {}",
                unique,
                quote_ident(index),
                table,
                definition
            ),
        ));
    }

    if !state.rls_enabled {
        statements.push(Statement::new(
            StatementKind::EnableRls,
            format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", table),
        ));
    }

    for policy in POLICIES {
        if state.policies.contains(policy) {
            continue;
        }
        let clause = match policy {
            POLICY_SELECT_OWN_ACTIVE => "FOR SELECT USING (email = auth.email() AND is_active)",
            POLICY_INSERT_OWN => "FOR INSERT WITH CHECK (email = auth.email())",
            POLICY_UPDATE_OWN => {
                "FOR UPDATE USING (email = auth.email()) WITH CHECK (email = auth.email())"
            }
            POLICY_DEACTIVATE_OWN => {
                "FOR UPDATE USING (email = auth.email() AND is_active) \
                 WITH CHECK (email = auth.email() AND NOT is_active)"
            }
            _ => continue,
        };
        statements.push(Statement::new(
            StatementKind::CreatePolicy {
                name: policy.to_string(),
            },
            format!(
                "DO $$\nBEGIN\n  IF NOT EXISTS (\n    SELECT 1 FROM pg_policies\n    \
                 WHERE schemaname = {} AND tablename = {} AND policyname = {}\n  ) THEN\n    \
                 CREATE POLICY {} ON {} {};\n  END IF;\nEND\n$$",
                quote_literal(target.schema()),
                quote_literal(target.table()),
                quote_literal(policy),
                quote_ident(policy),
                table,
                clause
            ),
        ));
    }

    tracing::debug!(
        target_relation = %target.display_name(),
        statements = statements.len(),
        "Planned configuration store setup"
    );

    StatementSet {
        statements,
        transactional: false,
    }
}

/// Operator-facing notes that accompany every setup plan.
pub fn setup_notes() -> Vec<String> {
    vec![
        format!(
            "only {} is created or modified; no other relation or policy is touched",
            ConfigTarget::fixed().display_name()
        ),
        "policies key on auth.email(), which is unavailable to service-role sessions; \
         service-role writes bypass RLS and must set email explicitly"
            .to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_target_gets_full_plan() {
        let plan = plan_setup(&ProvisionState::fresh());
        assert_eq!(plan.len(), 10);
        assert!(!plan.transactional);
        assert_eq!(plan.statements[0].kind, StatementKind::CreateTable);
        assert!(plan.statements[0].sql.starts_with(
            "CREATE TABLE IF NOT EXISTS \"public\".\"tool_configurations\""
        ));
        assert!(plan.render().contains(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uq_tool_config_active_per_email\" \
             ON \"public\".\"tool_configurations\" (email) WHERE is_active;"
        ));
    }

    #[test]
    fn test_replanning_after_apply_is_empty() {
        let mut state = ProvisionState::fresh();
        let first = plan_setup(&state);
        state.apply(&first);

        assert!(state.is_complete());
        assert_eq!(state, ProvisionState::complete());
        assert!(plan_setup(&state).is_empty());
    }

    #[test]
    fn test_partial_state_plans_only_missing_objects() {
        let mut state = ProvisionState::complete();
        state.policies.remove(POLICY_DEACTIVATE_OWN);
        state.indexes.remove(INDEX_EMAIL_VERSION);

        let plan = plan_setup(&state);
        let kinds: Vec<_> = plan.kinds().cloned().collect();
        assert_eq!(
            kinds,
            vec![
                StatementKind::CreateIndex {
                    name: INDEX_EMAIL_VERSION.to_string()
                },
                StatementKind::CreatePolicy {
                    name: POLICY_DEACTIVATE_OWN.to_string()
                },
            ]
        );
        assert_eq!(
            state.missing(),
            vec![
                "index uq_tool_config_email_version".to_string(),
                "policy deactivate_own".to_string()
            ]
        );
    }

    #[test]
    fn test_policies_are_guarded() {
        let plan = plan_setup(&ProvisionState::fresh());
        for stmt in &plan.statements {
            if let StatementKind::CreatePolicy { name } = &stmt.kind {
                assert!(stmt.sql.contains("IF NOT EXISTS"));
                assert!(stmt.sql.contains(&format!("policyname = '{}'", name)));
            }
        }
    }

    #[test]
    fn test_every_statement_targets_config_table() {
        let plan = plan_setup(&ProvisionState::fresh());
        for stmt in &plan.statements {
            assert!(stmt.sql.contains("\"public\".\"tool_configurations\""));
        }
    }
}
