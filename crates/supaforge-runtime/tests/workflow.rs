use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use supaforge_core::{DiscoveryDocument, ForgeConfig, ForgeError, Operation};
use supaforge_provision::{ProvisionState, SqlParam, StatementKind, StatementSet};
use supaforge_runtime::{
    CancelHandle, Confirmation, Coordinator, DiscoveryProvider, ExecutionReport, InputAnswer,
    InputField, InputValues, OperatorPrompt, ProvisionRequest, Review, SessionInputs,
    SqlExecutor, WorkflowState,
};

// =============================================================================
// Fakes
// =============================================================================

fn orders_document() -> DiscoveryDocument {
    serde_json::from_value(json!({
        "tables": [{
            "schema": "public",
            "name": "orders",
            "columns": [
                {"name": "id", "type": "bigint", "nullable": false, "default": "nextval('orders_id_seq')"},
                {"name": "email", "type": "text", "nullable": false},
                {"name": "total", "type": "numeric", "nullable": false},
                {"name": "secret_note", "type": "text"}
            ],
            "primary_key": ["id"],
            "rls_enabled": true,
            "policies": [{"name": "owner_select", "command": "SELECT"}],
            "sensitive_columns": ["secret_note"]
        }],
        "limitations": [{"tool": "list_edge_functions", "error": "token sbp_0123abcd expired"}]
    }))
    .unwrap()
}

#[derive(Clone)]
struct FakeDiscovery {
    doc: DiscoveryDocument,
    fail_first: usize,
    calls: Arc<AtomicUsize>,
}

impl FakeDiscovery {
    fn ok() -> Self {
        Self {
            doc: orders_document(),
            fail_first: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(times: usize) -> Self {
        Self {
            fail_first: times,
            ..Self::ok()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryProvider for FakeDiscovery {
    async fn discover(&self, _project_ref: &str) -> anyhow::Result<DiscoveryDocument> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            anyhow::bail!("list_tables: connection reset by peer");
        }
        Ok(self.doc.clone())
    }
}

#[derive(Debug, Clone)]
struct Row {
    email: String,
    version: i32,
    is_active: bool,
}

#[derive(Default)]
struct Store {
    state: ProvisionState,
    rows: Vec<Row>,
    executed: Vec<StatementSet>,
}

/// Applies statement kinds to an in-memory store.
#[derive(Clone, Default)]
struct MemoryExecutor {
    store: Arc<Mutex<Store>>,
    fail_with: Option<String>,
    cancel_on_execute: Arc<Mutex<Option<CancelHandle>>>,
    cancel_results: Arc<Mutex<Vec<Result<(), ForgeError>>>>,
}

#[async_trait]
impl SqlExecutor for MemoryExecutor {
    async fn execute(&self, set: &StatementSet) -> anyhow::Result<ExecutionReport> {
        if let Some(handle) = self.cancel_on_execute.lock().unwrap().as_ref() {
            self.cancel_results.lock().unwrap().push(handle.cancel());
        }
        if let Some(text) = &self.fail_with {
            anyhow::bail!("{}", text);
        }

        let mut store = self.store.lock().unwrap();
        store.state.apply(set);
        for stmt in &set.statements {
            match &stmt.kind {
                StatementKind::DeactivateActive { email } => {
                    for row in store.rows.iter_mut().filter(|r| &r.email == email) {
                        row.is_active = false;
                    }
                }
                StatementKind::InsertNextVersion { email } => {
                    assert!(matches!(stmt.params[2], SqlParam::Json(_)));
                    let version = store
                        .rows
                        .iter()
                        .filter(|r| &r.email == email)
                        .map(|r| r.version)
                        .max()
                        .unwrap_or(0)
                        + 1;
                    store.rows.push(Row {
                        email: email.clone(),
                        version,
                        is_active: true,
                    });
                }
                _ => {}
            }
        }
        store.executed.push(set.clone());
        Ok(ExecutionReport {
            statements_run: set.len(),
            message: format!("{} statements executed", set.len()),
        })
    }

    async fn provisioned_objects(&self) -> anyhow::Result<ProvisionState> {
        Ok(self.store.lock().unwrap().state.clone())
    }
}

#[derive(Clone, Default)]
struct ScriptedPrompt {
    answers: Arc<Mutex<VecDeque<InputAnswer>>>,
    confirmations: Arc<Mutex<VecDeque<Confirmation>>>,
    asked: Arc<Mutex<Vec<Vec<InputField>>>>,
    rounds: Arc<Mutex<Vec<u32>>>,
    cancel_on_confirm: Arc<Mutex<Option<CancelHandle>>>,
}

impl ScriptedPrompt {
    fn new(answers: Vec<InputAnswer>, confirmations: Vec<Confirmation>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
            confirmations: Arc::new(Mutex::new(confirmations.into())),
            ..Default::default()
        }
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn ask_missing(&self, fields: &[InputField]) -> anyhow::Result<InputAnswer> {
        self.asked.lock().unwrap().push(fields.to_vec());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted answer"))
    }

    async fn confirm(&self, review: &Review<'_>) -> anyhow::Result<Confirmation> {
        self.rounds.lock().unwrap().push(review.round);
        if let Some(handle) = self.cancel_on_confirm.lock().unwrap().as_ref() {
            handle.cancel().unwrap();
        }
        Ok(self
            .confirmations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Confirmation::Accept { provision: None }))
    }
}

fn full_inputs() -> SessionInputs {
    SessionInputs {
        project_ref: Some("abcd1234".into()),
        owner_email: Some("a@x.com".into()),
        categories: Some([Operation::Select].into_iter().collect()),
        ..Default::default()
    }
}

fn provision(execute: bool, insert_tools: bool) -> Confirmation {
    Confirmation::Accept {
        provision: Some(ProvisionRequest {
            execute,
            insert_tools,
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_happy_path_without_provisioning() {
    let prompt = ScriptedPrompt::new(
        vec![InputAnswer::Values(InputValues {
            owner_email: Some("a@x.com".into()),
            declined: [InputField::Categories].into_iter().collect(),
            ..Default::default()
        })],
        vec![],
    );
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        MemoryExecutor::default(),
        prompt.clone(),
    );

    let outcome = coordinator
        .run(SessionInputs {
            project_ref: Some("abcd1234".into()),
            ..Default::default()
        })
        .await;

    assert!(outcome.is_done());
    assert_eq!(
        outcome.history,
        vec![
            WorkflowState::CollectingInputs,
            WorkflowState::Discovering,
            WorkflowState::Compiling,
            WorkflowState::AwaitingConfirmation,
            WorkflowState::Assembling,
            WorkflowState::Done,
        ]
    );
    assert_eq!(
        prompt.asked.lock().unwrap()[0],
        vec![InputField::OwnerEmail, InputField::Categories]
    );

    let tools = &outcome.bundle.tools.tools;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "list_orders");
    assert_eq!(tools[0].select, vec!["id", "email", "total"]);
    assert!(outcome.bundle.sql.is_none());
    assert_eq!(outcome.bundle.blocks().unwrap().len(), 3);
}

#[tokio::test]
async fn test_regeneration_reuses_snapshot() {
    let discovery = FakeDiscovery::ok();
    let prompt = ScriptedPrompt::new(
        vec![],
        vec![Confirmation::Regenerate {
            categories: [Operation::Select, Operation::Update].into_iter().collect(),
        }],
    );
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        discovery.clone(),
        MemoryExecutor::default(),
        prompt.clone(),
    );

    let outcome = coordinator.run(full_inputs()).await;

    assert!(outcome.is_done());
    assert_eq!(discovery.calls(), 1);
    assert_eq!(*prompt.rounds.lock().unwrap(), vec![1, 2]);
    let names: Vec<&str> = outcome
        .bundle
        .tools
        .tools
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["list_orders", "update_order_email", "update_order_total"]
    );
}

#[tokio::test]
async fn test_regeneration_limit_aborts() {
    let mut config = ForgeConfig::default();
    config.workflow.max_regenerations = 1;
    let regenerate = || Confirmation::Regenerate {
        categories: [Operation::Select].into_iter().collect(),
    };
    let prompt = ScriptedPrompt::new(vec![], vec![regenerate(), regenerate(), regenerate()]);
    let coordinator = Coordinator::new(
        config,
        FakeDiscovery::ok(),
        MemoryExecutor::default(),
        prompt.clone(),
    );

    let outcome = coordinator.run(full_inputs()).await;

    assert_eq!(outcome.final_state, WorkflowState::Aborted);
    assert_eq!(*prompt.rounds.lock().unwrap(), vec![1, 2]);
    assert!(outcome.abort_reason.unwrap().contains("regeneration limit"));
    assert_eq!(outcome.bundle.tools.tools.len(), 1);
}

#[tokio::test]
async fn test_discovery_failure_aborts_after_one_retry() {
    let discovery = FakeDiscovery::failing(5);
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        discovery.clone(),
        MemoryExecutor::default(),
        ScriptedPrompt::default(),
    );

    let outcome = coordinator.run(full_inputs()).await;

    assert_eq!(outcome.final_state, WorkflowState::Aborted);
    assert_eq!(discovery.calls(), 2);
    match outcome.error {
        Some(ForgeError::CollaboratorFailure { message, .. }) => {
            assert_eq!(message, "list_tables: connection reset by peer");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let limitations = &outcome.bundle.discovery.limitations;
    assert_eq!(limitations.len(), 1);
    assert_eq!(
        limitations[0].error,
        "list_tables: connection reset by peer (retried once)"
    );
    assert!(outcome.bundle.tools.tools.is_empty());
    assert_eq!(outcome.bundle.blocks().unwrap().len(), 3);
}

#[tokio::test]
async fn test_discovery_recovers_on_retry() {
    let discovery = FakeDiscovery::failing(1);
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        discovery.clone(),
        MemoryExecutor::default(),
        ScriptedPrompt::default(),
    );

    let outcome = coordinator.run(full_inputs()).await;

    assert!(outcome.is_done());
    assert_eq!(discovery.calls(), 2);
    assert!(
        outcome
            .bundle
            .discovery
            .limitations
            .iter()
            .any(|l| l.error.contains("retried"))
    );
}

#[tokio::test]
async fn test_no_retry_when_disabled() {
    let mut config = ForgeConfig::default();
    config.workflow.retry_collaborator_once = false;
    let discovery = FakeDiscovery::failing(1);
    let coordinator = Coordinator::new(
        config,
        discovery.clone(),
        MemoryExecutor::default(),
        ScriptedPrompt::default(),
    );

    let outcome = coordinator.run(full_inputs()).await;
    assert_eq!(outcome.final_state, WorkflowState::Aborted);
    assert_eq!(discovery.calls(), 1);
}

#[tokio::test]
async fn test_two_provisioned_inserts_keep_one_active_row() {
    let executor = MemoryExecutor::default();

    for expected_statements in [10, 0] {
        let coordinator = Coordinator::new(
            ForgeConfig::default(),
            FakeDiscovery::ok(),
            executor.clone(),
            ScriptedPrompt::new(vec![], vec![provision(true, true)]),
        );
        let outcome = coordinator.run(full_inputs()).await;
        assert!(outcome.is_done());
        assert_eq!(
            outcome.history[outcome.history.len() - 3..],
            [
                WorkflowState::Provisioning,
                WorkflowState::Assembling,
                WorkflowState::Done
            ]
        );

        let sql = outcome.bundle.sql.unwrap();
        assert!(sql.executed);
        assert!(sql.insert_sql.is_some());
        if expected_statements == 0 {
            assert!(sql.sql.is_empty());
        } else {
            assert!(sql.sql.contains("CREATE TABLE IF NOT EXISTS"));
        }
    }

    let store = executor.store.lock().unwrap();
    let versions: Vec<(i32, bool)> = store.rows.iter().map(|r| (r.version, r.is_active)).collect();
    assert_eq!(versions, vec![(1, false), (2, true)]);
    assert!(store.state.is_complete());
}

#[tokio::test]
async fn test_execution_error_is_carried_forward() {
    let executor = MemoryExecutor {
        fail_with: Some("ERROR:  permission denied for schema public".to_string()),
        ..Default::default()
    };
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        executor.clone(),
        ScriptedPrompt::new(vec![], vec![provision(true, true)]),
    );

    let outcome = coordinator.run(full_inputs()).await;

    assert!(outcome.is_done());
    assert!(outcome.error.is_none());
    let sql = outcome.bundle.sql.unwrap();
    assert!(!sql.sql.is_empty());
    assert_eq!(
        sql.execution_result.as_deref(),
        Some("setup: ERROR:  permission denied for schema public")
    );
    assert!(sql.insert_sql.is_none());
    assert!(sql.notes.iter().any(|n| n.contains("retried once")));
    assert!(sql.notes.iter().any(|n| n.starts_with("insert withheld")));
    assert!(executor.store.lock().unwrap().rows.is_empty());
    assert_eq!(outcome.bundle.tools.tools.len(), 1);
}

#[tokio::test]
async fn test_sql_only_on_fresh_target_withholds_insert() {
    let executor = MemoryExecutor::default();
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        executor.clone(),
        ScriptedPrompt::new(vec![], vec![provision(false, true)]),
    );

    let outcome = coordinator.run(full_inputs()).await;

    let sql = outcome.bundle.sql.unwrap();
    assert!(!sql.executed);
    assert!(sql.execution_result.is_none());
    assert!(sql.insert_sql.is_none());
    assert!(sql.sql.contains("ENABLE ROW LEVEL SECURITY"));
    assert!(sql.notes.iter().any(|n| n.starts_with("insert withheld")));
    assert!(executor.store.lock().unwrap().executed.is_empty());
}

#[tokio::test]
async fn test_cancellation_refused_once_dispatched() {
    let executor = MemoryExecutor::default();
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        executor.clone(),
        ScriptedPrompt::new(vec![], vec![provision(true, false)]),
    );
    *executor.cancel_on_execute.lock().unwrap() = Some(coordinator.cancel_handle());

    let outcome = coordinator.run(full_inputs()).await;

    assert!(outcome.is_done());
    let results = executor.cancel_results.lock().unwrap();
    assert!(!results.is_empty());
    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(ForgeError::CancellationRefused(_))))
    );
    assert!(executor.store.lock().unwrap().state.is_complete());
}

#[tokio::test]
async fn test_cancellation_before_provisioning_aborts() {
    let prompt = ScriptedPrompt::new(
        vec![],
        vec![Confirmation::Regenerate {
            categories: [Operation::Rpc].into_iter().collect(),
        }],
    );
    let executor = MemoryExecutor::default();
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        executor.clone(),
        prompt.clone(),
    );
    *prompt.cancel_on_confirm.lock().unwrap() = Some(coordinator.cancel_handle());

    let outcome = coordinator.run(full_inputs()).await;

    assert_eq!(outcome.final_state, WorkflowState::Aborted);
    assert!(outcome.abort_reason.unwrap().contains("cancelled"));
    assert!(executor.store.lock().unwrap().executed.is_empty());
    assert_eq!(outcome.bundle.tools.tools.len(), 1);
}

#[tokio::test]
async fn test_dispatch_does_not_carry_into_next_session() {
    let executor = MemoryExecutor::default();
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        executor.clone(),
        ScriptedPrompt::new(vec![], vec![provision(true, false), provision(true, false)]),
    );

    let first = coordinator.run(full_inputs()).await;
    assert!(first.is_done());
    let executed = executor.store.lock().unwrap().executed.len();

    assert!(coordinator.cancel_handle().cancel().is_ok());
    let second = coordinator.run(full_inputs()).await;

    assert_eq!(second.final_state, WorkflowState::Aborted);
    assert_eq!(
        second.history,
        vec![WorkflowState::CollectingInputs, WorkflowState::Aborted]
    );
    assert!(second.abort_reason.unwrap().contains("cancelled"));
    assert_eq!(executor.store.lock().unwrap().executed.len(), executed);
}

#[tokio::test]
async fn test_cancel_applies_to_one_session_only() {
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        MemoryExecutor::default(),
        ScriptedPrompt::new(vec![], vec![]),
    );

    coordinator.cancel_handle().cancel().unwrap();
    let first = coordinator.run(full_inputs()).await;
    assert_eq!(first.final_state, WorkflowState::Aborted);

    let second = coordinator.run(full_inputs()).await;
    assert!(second.is_done());
    assert!(second.abort_reason.is_none());
    assert_eq!(second.bundle.tools.tools.len(), 1);
}

#[tokio::test]
async fn test_declined_project_ref_aborts() {
    let prompt = ScriptedPrompt::new(
        vec![InputAnswer::Values(InputValues {
            declined: [InputField::ProjectRef].into_iter().collect(),
            ..Default::default()
        })],
        vec![],
    );
    let discovery = FakeDiscovery::ok();
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        discovery.clone(),
        MemoryExecutor::default(),
        prompt,
    );

    let outcome = coordinator
        .run(SessionInputs {
            owner_email: Some("a@x.com".into()),
            categories: Some(BTreeSet::new()),
            ..Default::default()
        })
        .await;

    assert_eq!(outcome.final_state, WorkflowState::Aborted);
    assert_eq!(
        outcome.error,
        Some(ForgeError::InputIncomplete(vec!["project_ref".to_string()]))
    );
    assert_eq!(discovery.calls(), 0);
}

#[tokio::test]
async fn test_declined_email_blocks_only_the_insert() {
    let prompt = ScriptedPrompt::new(
        vec![InputAnswer::Values(InputValues {
            declined: [InputField::OwnerEmail].into_iter().collect(),
            ..Default::default()
        })],
        vec![provision(true, true)],
    );
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        MemoryExecutor::default(),
        prompt,
    );

    let outcome = coordinator
        .run(SessionInputs {
            project_ref: Some("abcd1234".into()),
            categories: Some([Operation::Select].into_iter().collect()),
            ..Default::default()
        })
        .await;

    assert!(outcome.is_done());
    let sql = outcome.bundle.sql.unwrap();
    assert!(sql.insert_sql.is_none());
    assert!(sql.notes.iter().any(|n| n.contains("owner email was not provided")));
}

#[tokio::test]
async fn test_operator_abort_keeps_compiled_tools() {
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        MemoryExecutor::default(),
        ScriptedPrompt::new(vec![], vec![Confirmation::Abort]),
    );

    let outcome = coordinator.run(full_inputs()).await;

    assert_eq!(outcome.final_state, WorkflowState::Aborted);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.bundle.tools.tools.len(), 1);
}

#[tokio::test]
async fn test_output_never_contains_access_tokens() {
    let coordinator = Coordinator::new(
        ForgeConfig::default(),
        FakeDiscovery::ok(),
        MemoryExecutor::default(),
        ScriptedPrompt::new(vec![], vec![provision(false, false)]),
    );

    let outcome = coordinator
        .run(SessionInputs {
            anon_key: Some("anon-public-key".into()),
            ..full_inputs()
        })
        .await;

    let rendered = outcome.bundle.render().unwrap();
    assert!(!rendered.contains("sbp_0123abcd"));
    assert!(rendered.contains("sbp_<redacted>"));
    assert!(rendered.contains("anon-public-key"));
    assert!(rendered.contains("<USER_PASSWORD_placeholder>"));
    assert!(rendered.contains("https://abcd1234.supabase.co"));
    assert!(rendered.contains("4) SQL_JSON"));
}
