mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tabledeck",
    about = "Track dataset freshness and run table actions over loaded datasets",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .tabledeck/ or .git/)
    #[arg(long, global = true, env = "TABLEDECK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the .tabledeck/ tree with the default slots and actions
    Init,

    /// Show slot generations and action readiness/staleness
    Status,

    /// Load a CSV file into a dataset slot (bumps its generation)
    Load {
        /// Slot name, e.g. "raptor"
        slot: String,
        /// CSV file with a header row
        file: PathBuf,
    },

    /// Run an action and store its result table
    Run {
        /// Action key, e.g. "missingness"
        action: String,
    },

    /// List registered actions with dependencies and freshness
    Actions,

    /// Print a stored action result
    Show {
        /// Action key
        action: String,
        /// Substring search across non-numeric columns
        #[arg(long)]
        search: Option<String>,
        /// Print at most this many rows
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Load { slot, file } => cmd::load::run(&root, &slot, &file, cli.json),
        Commands::Run { action } => cmd::run::run(&root, &action, cli.json),
        Commands::Actions => cmd::actions::run(&root, cli.json),
        Commands::Show {
            action,
            search,
            limit,
        } => cmd::show::run(&root, &action, search.as_deref(), limit, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
