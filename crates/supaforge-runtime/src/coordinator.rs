//! The workflow coordinator.
//!
//! ```text
//! CollectingInputs -> Discovering -> Compiling -> AwaitingConfirmation
//!                                        ^               |
//!                                        +-- regenerate -+-> Provisioning -> Assembling -> Done
//!                                                        +-----------------> Assembling
//! any non-terminal state -> Aborted
//! ```
//!
//! The coordinator owns no I/O. Discovery, execution and operator prompts
//! go through the collaborator traits; compilation and planning are pure
//! calls into `supaforge-compiler` and `supaforge-provision`. Every run
//! ends with an assembled bundle holding whatever the stages produced,
//! including runs that abort.

use crate::assembler::{DISCOVERY_LIMITATION_TOOL, OutputBundle, SqlBlock, StageResults, assemble};
use crate::collaborator::{DiscoveryProvider, ExecutionReport, OperatorPrompt, SqlExecutor};
use crate::control::CancelHandle;
use crate::session::{
    Confirmation, InputAnswer, InputField, ProvisionRequest, Review, SessionInputs,
};
use crate::state::WorkflowState;
use std::collections::BTreeSet;
use supaforge_compiler::{CompileRequest, compile};
use supaforge_core::{
    Collaborator, DiscoverySnapshot, ForgeConfig, ForgeError, Limitation, Operation,
    ToolsDocument,
};
use supaforge_provision::{
    ProvisionState, SetupOutcome, StatementSet, VersionedInsert, plan_setup,
    plan_versioned_insert, setup_notes,
};

const INPUT_FIELDS: [InputField; 3] = [
    InputField::ProjectRef,
    InputField::OwnerEmail,
    InputField::Categories,
];

/// Result of one session.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    /// `Done` or `Aborted`.
    pub final_state: WorkflowState,
    /// Every state entered, starting with `CollectingInputs`.
    pub history: Vec<WorkflowState>,
    /// The error that aborted the session, if any.
    pub error: Option<ForgeError>,
    /// Set when the operator aborted or cancelled.
    pub abort_reason: Option<String>,
    pub inputs: SessionInputs,
    pub bundle: OutputBundle,
}

impl WorkflowOutcome {
    pub fn is_done(&self) -> bool {
        self.final_state == WorkflowState::Done
    }
}

struct Session {
    state: WorkflowState,
    history: Vec<WorkflowState>,
    inputs: SessionInputs,
    declined: BTreeSet<InputField>,
    categories: BTreeSet<Operation>,
    compile_rounds: u32,
    provision: Option<ProvisionRequest>,
    results: StageResults,
    error: Option<ForgeError>,
    abort_reason: Option<String>,
}

impl Session {
    fn new(inputs: SessionInputs) -> Self {
        Self {
            state: WorkflowState::CollectingInputs,
            history: vec![WorkflowState::CollectingInputs],
            inputs,
            declined: BTreeSet::new(),
            categories: BTreeSet::new(),
            compile_rounds: 0,
            provision: None,
            results: StageResults::default(),
            error: None,
            abort_reason: None,
        }
    }

    fn transition(&mut self, next: WorkflowState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(from = %self.state, to = %next, "Workflow transition");
        self.state = next;
        self.history.push(next);
    }

    fn abort(&mut self, reason: impl Into<String>) -> WorkflowState {
        self.abort_reason = Some(reason.into());
        WorkflowState::Aborted
    }
}

/// Drives one operator session at a time through the workflow.
pub struct Coordinator<D: DiscoveryProvider, E: SqlExecutor, P: OperatorPrompt> {
    config: ForgeConfig,
    discovery: D,
    executor: E,
    prompt: P,
    cancel: CancelHandle,
}

impl<D: DiscoveryProvider, E: SqlExecutor, P: OperatorPrompt> Coordinator<D, E, P> {
    pub fn new(config: ForgeConfig, discovery: D, executor: E, prompt: P) -> Self {
        Self {
            config,
            discovery,
            executor,
            prompt,
            cancel: CancelHandle::new(),
        }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Handle for cancelling the session from another task.
    ///
    /// A cancel issued while no session runs applies to the next `run`.
    /// Each `run` clears the handle when it finishes.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run a session to `Done` or `Aborted`.
    pub async fn run(&self, inputs: SessionInputs) -> WorkflowOutcome {
        let mut session = Session::new(inputs);

        while !session.state.is_terminal() {
            if session.state.accepts_cancellation() && self.cancel.is_cancelled() {
                let next = session.abort(format!("cancelled by operator during {}", session.state));
                session.transition(next);
                break;
            }

            let step = match session.state {
                WorkflowState::CollectingInputs => self.collect_inputs(&mut session).await,
                WorkflowState::Discovering => self.discover(&mut session).await,
                WorkflowState::Compiling => self.compile(&mut session),
                WorkflowState::AwaitingConfirmation => self.await_confirmation(&mut session).await,
                WorkflowState::Provisioning => self.provision(&mut session).await,
                WorkflowState::Assembling => Ok(WorkflowState::Done),
                WorkflowState::Done | WorkflowState::Aborted => break,
            };

            match step {
                Ok(next) => session.transition(next),
                Err(err) => {
                    tracing::warn!(state = %session.state, error = %err, "Workflow aborted");
                    session.error = Some(err);
                    session.transition(WorkflowState::Aborted);
                }
            }
        }

        self.cancel.reset();
        let bundle = assemble(&self.config.mcp_client, &session.inputs, &session.results);

        WorkflowOutcome {
            final_state: session.state,
            history: session.history,
            error: session.error,
            abort_reason: session.abort_reason,
            inputs: session.inputs,
            bundle,
        }
    }

    // -------------------------------------------------------------------------
    // CollectingInputs
    // -------------------------------------------------------------------------

    async fn collect_inputs(&self, session: &mut Session) -> Result<WorkflowState, ForgeError> {
        for round in 1..=self.config.workflow.max_prompt_rounds {
            let missing = pending_fields(session);
            if missing.is_empty() {
                break;
            }
            tracing::debug!(round, missing = ?missing, "Asking operator for inputs");

            let answer = self
                .prompt
                .ask_missing(&missing)
                .await
                .map_err(|e| ForgeError::collaborator(Collaborator::Prompt, format!("{:#}", e)))?;

            match answer {
                InputAnswer::Abort => {
                    return Ok(session.abort("operator aborted while inputs were collected"));
                }
                InputAnswer::Values(values) => {
                    session.declined.extend(values.declined.iter().copied());
                    session.inputs.merge(values);
                }
            }
        }

        let declined_required: Vec<String> = session
            .declined
            .iter()
            .filter(|f| f.is_required() && !session.inputs.has(**f))
            .map(|f| f.to_string())
            .collect();
        if !declined_required.is_empty() {
            return Err(ForgeError::InputIncomplete(declined_required));
        }

        let still_missing = pending_fields(session);
        if !still_missing.is_empty() {
            return Err(ForgeError::InputIncomplete(
                still_missing.iter().map(|f| f.to_string()).collect(),
            ));
        }

        session.categories = match &session.inputs.categories {
            Some(categories) => categories.clone(),
            None => self.config.compiler.default_categories.iter().copied().collect(),
        };

        Ok(WorkflowState::Discovering)
    }

    // -------------------------------------------------------------------------
    // Discovering
    // -------------------------------------------------------------------------

    async fn discover(&self, session: &mut Session) -> Result<WorkflowState, ForgeError> {
        let project_ref = session
            .inputs
            .project_ref
            .clone()
            .ok_or_else(|| ForgeError::InputIncomplete(vec![InputField::ProjectRef.to_string()]))?;

        let attempts = if self.config.workflow.retry_collaborator_once { 2 } else { 1 };
        let mut last_error: Option<String> = None;

        for attempt in 1..=attempts {
            match self.discovery.discover(&project_ref).await {
                Ok(doc) => {
                    if let Some(previous) = last_error.take() {
                        session.results.workflow_limitations.push(Limitation::new(
                            DISCOVERY_LIMITATION_TOOL,
                            format!("first attempt failed and was retried: {}", previous),
                        ));
                    }
                    let snapshot = DiscoverySnapshot::from_document_lenient(doc);
                    tracing::info!(
                        project_ref = %project_ref,
                        tables = snapshot.tables().len(),
                        functions = snapshot.functions().len(),
                        limitations = snapshot.limitations().len(),
                        "Discovery finished"
                    );
                    session.results.snapshot = Some(snapshot);
                    return Ok(WorkflowState::Compiling);
                }
                Err(err) => {
                    let text = format!("{:#}", err);
                    tracing::warn!(attempt, error = %text, "Discovery attempt failed");
                    last_error = Some(text);
                }
            }
        }

        let text = last_error.unwrap_or_default();
        let recorded = if attempts > 1 {
            format!("{} (retried once)", text)
        } else {
            text.clone()
        };
        session
            .results
            .workflow_limitations
            .push(Limitation::new(DISCOVERY_LIMITATION_TOOL, recorded));
        Err(ForgeError::collaborator(Collaborator::Discovery, text))
    }

    // -------------------------------------------------------------------------
    // Compiling / AwaitingConfirmation
    // -------------------------------------------------------------------------

    fn compile(&self, session: &mut Session) -> Result<WorkflowState, ForgeError> {
        let output = {
            let snapshot = session.results.snapshot.as_ref().ok_or_else(|| {
                ForgeError::MalformedDiscovery("no discovery snapshot to compile".to_string())
            })?;
            let mut request = CompileRequest::new(session.categories.iter().copied())
                .allow_sensitive_writes(session.inputs.allow_sensitive_writes);
            if let Some(tables) = &session.inputs.tables {
                request = request.with_tables(tables.iter().cloned());
            }
            compile(snapshot, &self.config.compiler, &request)
        };

        session.compile_rounds += 1;
        tracing::info!(
            round = session.compile_rounds,
            tools = output.tools.len(),
            skipped = output.skipped.len(),
            "Compilation round finished"
        );
        session.results.compiled = Some(output);
        Ok(WorkflowState::AwaitingConfirmation)
    }

    async fn await_confirmation(&self, session: &mut Session) -> Result<WorkflowState, ForgeError> {
        let decision = {
            let (Some(snapshot), Some(output)) =
                (&session.results.snapshot, &session.results.compiled)
            else {
                return Err(ForgeError::MalformedDiscovery(
                    "nothing compiled to confirm".to_string(),
                ));
            };
            let review = Review {
                project_ref: session.inputs.project_ref.as_deref().unwrap_or_default(),
                categories: &session.categories,
                output,
                limitations: snapshot.limitations(),
                round: session.compile_rounds,
            };
            self.prompt
                .confirm(&review)
                .await
                .map_err(|e| ForgeError::collaborator(Collaborator::Prompt, format!("{:#}", e)))?
        };

        match decision {
            Confirmation::Accept { provision: None } => Ok(WorkflowState::Assembling),
            Confirmation::Accept {
                provision: Some(request),
            } => {
                session.provision = Some(request);
                Ok(WorkflowState::Provisioning)
            }
            Confirmation::Regenerate { categories } => {
                if session.compile_rounds > self.config.workflow.max_regenerations {
                    return Ok(session.abort(format!(
                        "regeneration limit of {} reached without acceptance",
                        self.config.workflow.max_regenerations
                    )));
                }
                tracing::debug!(categories = ?categories, "Operator requested regeneration");
                session.categories = categories;
                Ok(WorkflowState::Compiling)
            }
            Confirmation::Abort => Ok(session.abort("operator rejected the compiled tools")),
        }
    }

    // -------------------------------------------------------------------------
    // Provisioning
    // -------------------------------------------------------------------------

    async fn provision(&self, session: &mut Session) -> Result<WorkflowState, ForgeError> {
        let request = session.provision.unwrap_or_default();

        let proceed = if request.execute {
            self.cancel.dispatch()
        } else {
            !self.cancel.is_cancelled()
        };
        if !proceed {
            return Ok(session.abort("cancelled before provisioning was dispatched"));
        }

        let mut block = SqlBlock {
            executed: request.execute,
            notes: setup_notes(),
            ..Default::default()
        };
        let mut results: Vec<String> = Vec::new();

        let mut state = match self.executor.provisioned_objects().await {
            Ok(state) => state,
            Err(err) => {
                block.notes.push(format!(
                    "could not inspect existing provisioning objects, planned for a fresh target: {:#}",
                    err
                ));
                ProvisionState::fresh()
            }
        };

        let setup = plan_setup(&state);
        if setup.is_empty() {
            block
                .notes
                .push("configuration store already provisioned; no setup statements needed".to_string());
        }
        block.sql = setup.render();

        let outcome = if request.execute && !setup.is_empty() {
            match self.execute(&setup, &mut block.notes).await {
                Ok(report) => {
                    results.push(format!("setup: {}", report.message));
                    state.apply(&setup);
                    SetupOutcome::observe(&state)
                }
                Err(text) => {
                    results.push(format!("setup: {}", text));
                    SetupOutcome::failed(text)
                }
            }
        } else {
            SetupOutcome::observe(&state)
        };

        if !request.execute && !setup.is_empty() {
            block
                .notes
                .push("SQL was not executed; run it with an administrative connection".to_string());
        }
        if request.insert_tools {
            self.insert_tools(session, request, &outcome, &mut block, &mut results)
                .await;
        }

        block.execution_result = if results.is_empty() {
            None
        } else {
            Some(results.join("\n"))
        };
        session.results.sql = Some(block);
        Ok(WorkflowState::Assembling)
    }

    async fn insert_tools(
        &self,
        session: &Session,
        request: ProvisionRequest,
        outcome: &SetupOutcome,
        block: &mut SqlBlock,
        results: &mut Vec<String>,
    ) {
        let Some(email) = session.inputs.owner_email.clone() else {
            block
                .notes
                .push("owner email was not provided; tools were not stored".to_string());
            return;
        };
        let tools = session
            .results
            .compiled
            .as_ref()
            .map(|c| c.tools.clone())
            .unwrap_or_default();

        let insert = VersionedInsert {
            email,
            project_name: session.inputs.project_name.clone(),
            tools: ToolsDocument { tools },
        };

        let set = match plan_versioned_insert(outcome, &insert) {
            Ok(set) => set,
            Err(err) => {
                block.notes.push(format!("insert withheld: {}", err));
                return;
            }
        };
        block.insert_sql = Some(set.render());

        if request.execute {
            match self.execute(&set, &mut block.notes).await {
                Ok(report) => results.push(format!("insert: {}", report.message)),
                Err(text) => results.push(format!("insert: {}", text)),
            }
        }
    }

    /// Run `set`, retrying once when configured. Errors come back as the
    /// executor's own text.
    async fn execute(&self, set: &StatementSet, notes: &mut Vec<String>) -> Result<ExecutionReport, String> {
        let attempts = if self.config.workflow.retry_collaborator_once { 2 } else { 1 };
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            tracing::info!(
                attempt,
                statements = set.len(),
                transactional = set.transactional,
                "Dispatching statements"
            );
            match self.executor.execute(set).await {
                Ok(report) => return Ok(report),
                Err(err) => {
                    last_error = format!("{:#}", err);
                    tracing::warn!(attempt, error = %last_error, "Execution failed");
                    if attempt < attempts {
                        notes.push(format!(
                            "execution failed and was retried once: {}",
                            last_error
                        ));
                    }
                }
            }
        }
        Err(last_error)
    }
}

/// Fields neither supplied nor declined.
fn pending_fields(session: &Session) -> Vec<InputField> {
    INPUT_FIELDS
        .into_iter()
        .filter(|f| !session.inputs.has(*f) && !session.declined.contains(f))
        .collect()
}
