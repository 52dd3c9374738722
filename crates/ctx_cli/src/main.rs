//! ctx CLI - reproducible, debuggable agent execution records.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ctx")]
#[command(about = "Content-addressed store for agent execution records", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new context store
    Init,
    /// Create a context pack from an execution log
    Pack {
        /// Path to the execution log JSON file
        log_file: String,
    },
    /// Inspect a context pack
    Show {
        /// Pack hash (full, prefix, or ctx:// URI)
        hash: String,
    },
    /// List context packs
    Log {
        /// Maximum number of packs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Compare two context packs
    Diff {
        /// First pack hash
        hash_a: String,
        /// Second pack hash
        hash_b: String,
        /// Emit JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Replay a captured agent run
    Replay {
        /// Pack hash
        hash: String,
        /// Emit JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Fork a context pack into a mutable draft
    Fork {
        /// Source pack hash
        hash: String,
    },
    /// Finalize a draft into an immutable pack
    Finalize {
        /// Path to the draft file
        draft: String,
    },
    /// Index a commit into the context graph
    Index {
        /// Commit SHA (defaults to HEAD)
        commit: Option<String>,
        /// Index a whole range as base..head
        #[arg(long)]
        range: Option<String>,
    },
    /// Show changes between two indexed commits
    Delta {
        /// Base commit SHA
        base: String,
        /// Head commit SHA
        head: String,
        /// Emit JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Generate an optimized context pack for a task
    Optimize {
        /// Task description
        #[arg(short, long)]
        task: String,
        /// Commit SHA (defaults to HEAD)
        #[arg(long)]
        commit: Option<String>,
        /// Token budget
        #[arg(long, default_value = "32000")]
        budget: i64,
        /// Include test files
        #[arg(long)]
        include_tests: bool,
        /// Emit JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Display token savings dashboard
    Metrics {
        /// Maximum number of runs to aggregate
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Verify artifact provenance
    Verify {
        /// Path to the artifact
        artifact: String,
    },
}

fn main() -> Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=debug); quiet by default.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Pack { log_file } => commands::pack::create(&log_file),
        Commands::Show { hash } => commands::pack::show(&hash),
        Commands::Log { limit } => commands::pack::list(limit),
        Commands::Diff { hash_a, hash_b, json } => commands::diff::run(&hash_a, &hash_b, json),
        Commands::Replay { hash, json } => commands::replay::run(&hash, json),
        Commands::Fork { hash } => commands::fork::fork(&hash),
        Commands::Finalize { draft } => commands::fork::finalize(&draft),
        Commands::Index { commit, range } => {
            commands::index::run(commit.as_deref(), range.as_deref())
        }
        Commands::Delta { base, head, json } => commands::index::delta(&base, &head, json),
        Commands::Optimize {
            task,
            commit,
            budget,
            include_tests,
            json,
        } => commands::optimize::run(&task, commit.as_deref(), budget, include_tests, json),
        Commands::Metrics { limit } => commands::metrics::run(limit),
        Commands::Verify { artifact } => commands::verify::run(&artifact),
    }
}
