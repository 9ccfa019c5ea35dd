//! CLI for the mfetch model downloader.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mfetch_core::catalog::Catalog;
use mfetch_core::config::{self, FetchConfig};
use mfetch_core::coordinator::Coordinator;
use std::path::{Path, PathBuf};

use commands::{run_cancel, run_checksum, run_download, run_forget, run_list, run_resume, run_status};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mfetch")]
#[command(about = "mfetch: resumable multi-mirror model downloader", long_about = None)]
pub struct Cli {
    /// Application root (overrides `root_dir` from config.toml).
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// More log detail (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List catalog artifacts and whether they are installed.
    List,

    /// Show download records (all, or one artifact).
    Status {
        /// Artifact identifier.
        id: Option<String>,
    },

    /// Download an artifact and follow its progress until it stops.
    Download {
        /// Artifact identifier.
        id: String,
    },

    /// Resume a paused artifact and follow its progress.
    Resume {
        /// Artifact identifier.
        id: String,
    },

    /// Discard partial data of a paused or failed artifact.
    Cancel {
        /// Artifact identifier.
        id: String,
    },

    /// Drop the download record of an artifact (files are kept).
    Forget {
        /// Artifact identifier.
        id: String,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    pub fn run(cli: Cli) -> Result<()> {
        if let CliCommand::Checksum { path } = &cli.command {
            return run_checksum(Path::new(path));
        }

        let mut cfg = config::load_or_init()?;
        if let Some(root) = cli.root {
            cfg.root_dir = Some(root);
        }
        tracing::debug!("loaded config: {:?}", cfg);
        let coordinator = build_coordinator(&cfg)?;

        match cli.command {
            CliCommand::List => run_list(&coordinator),
            CliCommand::Status { id } => run_status(&coordinator, id.as_deref()),
            CliCommand::Download { id } => run_download(&coordinator, &id),
            CliCommand::Resume { id } => run_resume(&coordinator, &id),
            CliCommand::Cancel { id } => run_cancel(&coordinator, &id),
            CliCommand::Forget { id } => run_forget(&coordinator, &id),
            CliCommand::Checksum { .. } => Ok(()),
        }
    }
}

fn build_coordinator(cfg: &FetchConfig) -> Result<Coordinator> {
    let catalog = match &cfg.catalog_path {
        Some(path) => Catalog::load_toml(path).with_context(|| format!("load catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };
    Coordinator::from_config(cfg, catalog)
}

#[cfg(test)]
mod tests;
