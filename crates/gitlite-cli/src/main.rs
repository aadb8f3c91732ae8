//! Gitlite CLI - a minimal git client.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gitlite_storage::{DEFAULT_BRANCH, GIT_DIR_NAME};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::CatMode;
use config::Config;

/// Gitlite - a minimal git client
#[derive(Parser, Debug)]
#[command(name = "gitlite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "work-tree", default_value = ".", global = true)]
    work_tree: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty repository
    Init {
        /// Initial branch (default: config `branch`, then master)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Compute the blob id of a file
    HashObject {
        /// Also write the blob to the object store
        #[arg(short)]
        write: bool,
        /// File to hash
        file: PathBuf,
    },

    /// Show an object
    CatFile {
        /// Print the object type
        #[arg(short = 't', conflicts_with = "size")]
        kind: bool,
        /// Print the object size
        #[arg(short)]
        size: bool,
        /// Object id or unique prefix
        object: String,
    },

    /// Stage files
    Add {
        /// Paths relative to the work tree
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Write the index as a tree object
    WriteTree,

    /// List the entries of a tree or commit
    LsTree {
        /// Object id or unique prefix
        object: String,
    },

    /// Record the index as a new commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Push the current branch over smart HTTP
    Push {
        /// Remote URL (default: config `remote.url`)
        url: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gitlite={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let work_tree = cli.work_tree;
    let config = Config::load(&work_tree.join(GIT_DIR_NAME))
        .context("failed to load configuration")?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Init { branch } => {
            let branch = branch
                .or_else(|| config.branch.clone())
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
            commands::init(&work_tree, &branch, &mut out)?;
        }
        Commands::HashObject { write, file } => {
            commands::hash_object(&work_tree, &file, write, &mut out)?;
        }
        Commands::CatFile { kind, size, object } => {
            let mode = if kind {
                CatMode::Type
            } else if size {
                CatMode::Size
            } else {
                CatMode::Pretty
            };
            commands::cat_file(&work_tree, &object, mode, &mut out)?;
        }
        Commands::Add { paths } => commands::add(&work_tree, &paths, &mut out)?,
        Commands::WriteTree => commands::write_tree(&work_tree, &mut out)?,
        Commands::LsTree { object } => commands::ls_tree(&work_tree, &object, &mut out)?,
        Commands::Commit { message } => commands::commit(&work_tree, &message, &config, &mut out)?,
        Commands::Push { url } => {
            commands::push(&work_tree, url.as_deref(), &config, &mut out)?;
        }
    }
    Ok(())
}
