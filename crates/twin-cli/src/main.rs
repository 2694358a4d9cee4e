mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "twin",
    about = "Drivetrain fatigue twin: accumulate destruction, retrain and forecast in batches",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .twin/)
    #[arg(long, global = true, env = "TWIN_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Defaults to `run`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .twin/ with a default config, an empty ledger and store tables
    Init,

    /// Process the next batch: accumulate, train, predict, validate
    Run,

    /// Insert synthetic sensor readings, one per second
    Generate {
        /// First timestamp (unix seconds); defaults to just after the newest reading
        #[arg(long)]
        start: Option<i64>,

        /// Number of seconds to generate
        #[arg(long, default_value = "3600")]
        seconds: i64,

        /// RNG seed for reproducible data
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the training and prediction ledger
    Schedule,

    /// Compare stored predictions against results for a window
    Check {
        #[arg(long)]
        start: i64,

        #[arg(long)]
        stop: i64,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let default_level = match &command {
        Commands::Run | Commands::Generate { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Run => cmd::run::run(&root, cli.json),
        Commands::Generate {
            start,
            seconds,
            seed,
        } => cmd::generate::run(&root, start, seconds, seed, cli.json),
        Commands::Schedule => cmd::schedule::run(&root, cli.json),
        Commands::Check { start, stop } => cmd::check::run(&root, start, stop, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
