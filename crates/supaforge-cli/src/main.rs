use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use supaforge_core::{ForgeConfig, Operation};
use tracing_subscriber::EnvFilter;

mod commands;
mod prompt;
mod sources;

#[derive(Parser, Debug)]
#[command(
    name = "supaforge",
    version,
    about = "Compile a Supabase schema into safe MCP tool descriptors"
)]
struct Cli {
    /// Configuration file (YAML). Defaults apply when omitted.
    #[arg(long, global = true, env = "SUPAFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "supaforge_runtime=debug". Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Introspect a database and print the discovery document.
    Discover {
        #[command(flatten)]
        db: DatabaseArgs,

        /// Label recorded in logs for this project.
        #[arg(long, default_value = "local")]
        project_ref: String,
    },

    /// Compile a saved discovery document into tool descriptors.
    Compile {
        /// Discovery document (JSON) produced by `supaforge discover`.
        #[arg(long)]
        discovery: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Print the configuration-store setup SQL and, optionally, the insert
    /// for a new tools version.
    Sql {
        #[command(flatten)]
        db: DatabaseArgs,

        /// Owner email for the versioned insert.
        #[arg(long, requires = "tools")]
        email: Option<String>,

        /// Tools document (`{"tools": [...]}`) to store.
        #[arg(long, requires = "email")]
        tools: Option<PathBuf>,

        /// Project label stored alongside the tools.
        #[arg(long)]
        project_name: Option<String>,
    },

    /// Run the full workflow: inputs, discovery, compilation, confirmation,
    /// optional provisioning, output.
    Run(commands::run::RunArgs),
}

/// Connection to the project's database.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Postgres connection string. Never logged.
    #[arg(long, env = "SUPAFORGE_DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

/// Which descriptors to compile.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Operation categories, comma separated (select, insert, update, delete, rpc).
    #[arg(long, value_delimiter = ',', value_parser = parse_operation)]
    pub categories: Vec<Operation>,

    /// Restrict compilation to these tables (`table` or `schema.table`).
    #[arg(long = "table")]
    pub tables: Vec<String>,

    /// Allow sensitive columns in write descriptors.
    #[arg(long, default_value_t = false)]
    pub allow_sensitive_writes: bool,
}

fn parse_operation(s: &str) -> Result<Operation, String> {
    s.parse()
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ForgeConfig> {
    match path {
        Some(path) => ForgeConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load configuration from {:?}: {}", path, e)),
        None => Ok(ForgeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let config = load_config(cli.config.as_ref())?;

    match cli.cmd {
        Command::Discover { db, project_ref } => {
            commands::discover::run(&config, &db, &project_ref).await?
        }
        Command::Compile {
            discovery,
            selection,
        } => commands::compile::run(&config, &discovery, &selection).await?,
        Command::Sql {
            db,
            email,
            tools,
            project_name,
        } => commands::sql::run(&db, email, tools, project_name).await?,
        Command::Run(args) => commands::run::run(config, args).await?,
    }

    Ok(())
}
