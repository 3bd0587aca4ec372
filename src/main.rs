use anyhow::Result;
use clap::{Parser, Subcommand};
use memwatch::commands::common::Project;
use memwatch::commands::{health, restart, run, start, status, stop};
use memwatch::logging;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "memwatch")]
#[command(about = "Keep a memory store in sync with the documents in a project", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (defaults to <root>/.memwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (in the background unless --foreground)
    Start {
        /// Stay attached to the terminal
        #[arg(long)]
        foreground: bool,
    },

    /// Run in the foreground until interrupted (same as start --foreground)
    Run,

    /// Stop a running daemon
    Stop {
        /// Seconds to wait for the daemon to exit
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Stop and start the daemon
    Restart {
        /// Seconds to wait for the old daemon to exit
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Show daemon status
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run health checks (exit code 1 when unhealthy)
    Health {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let project = Project::load(cli.root, cli.config)?;

    match cli.command {
        Commands::Start { foreground } => start::execute(&project, foreground),
        Commands::Run => run::execute(&project),
        Commands::Stop { timeout } => stop::execute(&project, Duration::from_secs(timeout)),
        Commands::Restart { timeout } => {
            restart::execute(&project, Duration::from_secs(timeout))
        }
        Commands::Status { json } => status::execute(&project, json),
        Commands::Health { json } => {
            if !health::execute(&project, json)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
