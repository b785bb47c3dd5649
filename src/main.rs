//! snapdiff CLI - build and compare directory snapshots

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snapdiff::ops::{build_with_options, diff, fsck, gc, ls, BuildOptions};
use snapdiff::{delete_snapshot, list_snapshots, list_snapshots_matching, Store};

#[derive(Parser)]
#[command(name = "snapdiff")]
#[command(about = "content-addressed directory snapshots and diffs")]
#[command(version)]
struct Cli {
    /// snapshot store path
    #[arg(short, long, env = "SNAPDIFF_STORE", default_value = ".")]
    store: PathBuf,

    /// enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new snapshot store
    Init {
        /// path to create store at
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// snapshot a directory under an id (replaces any previous snapshot with that id)
    Build {
        /// root directory to snapshot
        root: PathBuf,

        /// snapshot id
        #[arg(short, long)]
        id: String,

        /// hashing worker limit
        #[arg(short, long)]
        workers: Option<usize>,

        /// follow symlinks instead of skipping them
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// show differences between two snapshots
    Diff {
        /// older snapshot id
        id_a: String,

        /// newer snapshot id
        id_b: String,

        /// print summary and details as json
        #[arg(long)]
        json: bool,
    },

    /// list entries of a snapshot
    Ls {
        /// snapshot id
        id: String,
    },

    /// list snapshot ids
    List {
        /// glob pattern to filter ids
        pattern: Option<String>,
    },

    /// delete a snapshot
    Delete {
        /// snapshot id
        id: String,
    },

    /// verify stored snapshot records
    Fsck,

    /// remove temp files left by interrupted builds and orphaned lock files
    Gc {
        /// only show what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

/// failures outside the library's own error type
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Snapdiff(#[from] snapdiff::Error),

    #[error("failed to write json output: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Init { path } => {
            Store::init(&path)?;
            println!("initialized snapshot store at {}", path.display());
        }

        Commands::Build {
            root,
            id,
            workers,
            follow_symlinks,
        } => {
            let store = Store::open(&cli.store)?;
            let options = BuildOptions {
                workers,
                follow_symlinks: follow_symlinks.then_some(true),
                cancel: None,
            };
            let count = build_with_options(&store, &root, &id, &options)?;
            println!("snapshot {} created with {} files", id, count);
        }

        Commands::Diff { id_a, id_b, json } => {
            let store = Store::open(&cli.store)?;
            let result = diff(&store, &id_a, &id_b)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for change in result.changes() {
                    println!("{}", change);
                }
                println!(
                    "{} added, {} deleted, {} modified",
                    result.summary.added, result.summary.deleted, result.summary.modified
                );
            }
        }

        Commands::Ls { id } => {
            let store = Store::open(&cli.store)?;
            for entry in ls(&store, &id)? {
                println!("{}", entry);
            }
        }

        Commands::List { pattern } => {
            let store = Store::open(&cli.store)?;
            let ids = match pattern {
                Some(p) => list_snapshots_matching(&store, &p)?,
                None => list_snapshots(&store)?,
            };

            for id in ids {
                println!("{}", id);
            }
        }

        Commands::Delete { id } => {
            let store = Store::open(&cli.store)?;
            delete_snapshot(&store, &id)?;
            println!("deleted snapshot {}", id);
        }

        Commands::Fsck => {
            let store = Store::open(&cli.store)?;
            let report = fsck(&store)?;

            println!("snapshots checked: {}", report.snapshots_checked);
            println!("entries checked: {}", report.entries_checked);

            if !report.corrupt_snapshots.is_empty() {
                println!("\ncorrupt snapshots:");
                for record in &report.corrupt_snapshots {
                    println!("  {}: {}", record.name, record.message);
                }
            }

            if report.is_ok() {
                println!("\nstore is healthy");
            } else {
                println!("\nstore has issues");
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Gc { dry_run } => {
            let store = Store::open(&cli.store)?;
            let stats = gc(&store, dry_run)?;

            let action = if dry_run { "would remove" } else { "removed" };
            println!("{} {} temp files", action, stats.tmp_files_removed);
            println!("{} {} lock files", action, stats.lock_files_removed);
            println!("freed {} bytes", stats.bytes_freed);
        }
    }

    Ok(ExitCode::SUCCESS)
}
