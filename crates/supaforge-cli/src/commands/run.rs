//! `supaforge run` drives one workflow session and prints the output bundle.
//!
//! On a terminal the operator is asked for missing inputs and for
//! acceptance. With `--yes` every answer comes from flags instead.

use crate::prompt::{ScriptedPrompt, StdinPrompt};
use crate::sources::{Discovery, Executor};
use crate::{DatabaseArgs, SelectionArgs};
use clap::Args;
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use supaforge_core::ForgeConfig;
use supaforge_runtime::{
    Coordinator, OperatorPrompt, ProvisionRequest, SessionInputs, WorkflowOutcome,
};
use tokio::sync::watch;
use tracing::{info, warn};

/// Conventional exit status after SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub db: DatabaseArgs,

    /// Use a saved discovery document instead of a live database.
    #[arg(long)]
    pub discovery: Option<PathBuf>,

    /// Supabase project reference.
    #[arg(long)]
    pub project_ref: Option<String>,

    #[arg(long)]
    pub project_name: Option<String>,

    /// Project URL; derived from the project reference when omitted.
    #[arg(long)]
    pub project_url: Option<String>,

    /// Public anon key to include in the client configuration.
    #[arg(long, env = "SUPAFORGE_ANON_KEY", hide_env_values = true)]
    pub anon_key: Option<String>,

    /// Owner email for stored tool versions.
    #[arg(long)]
    pub email: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Answer every question from flags; accept the compiled tools.
    #[arg(long, default_value_t = false)]
    pub yes: bool,

    /// With --yes: produce the provisioning SQL block.
    #[arg(long, default_value_t = false, requires = "yes")]
    pub provision: bool,

    /// With --provision: run the SQL against --database-url.
    #[arg(long, default_value_t = false, requires = "provision")]
    pub execute: bool,

    /// With --provision: store the tools as the next active version.
    #[arg(long, default_value_t = false, requires = "provision")]
    pub insert_tools: bool,
}

impl RunArgs {
    fn session_inputs(&self) -> SessionInputs {
        SessionInputs {
            project_ref: self.project_ref.clone(),
            project_name: self.project_name.clone(),
            project_url: self.project_url.clone(),
            anon_key: self.anon_key.clone(),
            owner_email: self.email.clone(),
            categories: (!self.selection.categories.is_empty())
                .then(|| self.selection.categories.iter().copied().collect::<BTreeSet<_>>()),
            tables: (!self.selection.tables.is_empty())
                .then(|| self.selection.tables.iter().cloned().collect::<BTreeSet<_>>()),
            allow_sensitive_writes: self.selection.allow_sensitive_writes,
        }
    }

    fn scripted_prompt(&self) -> ScriptedPrompt {
        ScriptedPrompt {
            accept: self.yes,
            provision: self.provision.then_some(ProvisionRequest {
                execute: self.execute,
                insert_tools: self.insert_tools,
            }),
        }
    }
}

pub async fn run(config: ForgeConfig, args: RunArgs) -> anyhow::Result<()> {
    if args.execute && args.db.database_url.is_none() {
        anyhow::bail!("--execute needs --database-url (or SUPAFORGE_DATABASE_URL)");
    }
    if !args.yes && !std::io::stdin().is_terminal() {
        anyhow::bail!("stdin is not a terminal; pass --yes for a scripted run");
    }

    let url = args.db.database_url.as_deref();
    let discovery = Discovery::open(args.discovery.clone(), url, &config.discovery).await?;
    let executor = Executor::open(url).await?;
    let inputs = args.session_inputs();

    let (interrupt, interrupted) = watch::channel(false);
    let outcome = if args.yes {
        drive(config, discovery, executor, args.scripted_prompt(), interrupt, inputs).await
    } else {
        let prompt = StdinPrompt::new(interrupted.clone());
        drive(config, discovery, executor, prompt, interrupt, inputs).await
    };

    println!("{}", outcome.bundle.render()?);

    if let Some(reason) = &outcome.abort_reason {
        warn!(reason = %reason, "Session aborted");
    }
    if outcome.abort_reason.is_some() && *interrupted.borrow() {
        // A stdin read may still be blocked; the runtime would wait on it.
        std::io::Write::flush(&mut std::io::stdout())?;
        std::process::exit(INTERRUPTED_EXIT);
    }
    if let Some(err) = &outcome.error {
        anyhow::bail!("{}", err.operator_text());
    }
    Ok(())
}

async fn drive<P: OperatorPrompt>(
    config: ForgeConfig,
    discovery: Discovery,
    executor: Executor,
    prompt: P,
    interrupt: watch::Sender<bool>,
    inputs: SessionInputs,
) -> WorkflowOutcome {
    let coordinator = Coordinator::new(config, discovery, executor, prompt);

    let cancel = coordinator.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.send_replace(true);
            match cancel.cancel() {
                Ok(()) => warn!("Cancellation requested"),
                Err(e) => warn!(error = %e, "Cancellation refused"),
            }
        }
    });

    let outcome = coordinator.run(inputs).await;
    watcher.abort();

    info!(
        state = %outcome.final_state,
        steps = outcome.history.len(),
        tools = outcome.bundle.tools.tools.len(),
        "Session finished"
    );
    outcome
}
