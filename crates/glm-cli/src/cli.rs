use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Rewrite GitLab attachment links in migrated issue and comment text
#[derive(Debug, Parser)]
#[command(name = "glm", version, about)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); environment variables otherwise
    #[arg(long, global = true, env = "GLM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rewrite attachment references, relocating files as configured
    Rewrite(RewriteArgs),
    /// List the attachment references found in a body
    Scan {
        /// Input file, stdin when omitted
        file: Option<PathBuf>,
    },
    /// Print the relocation key for upload paths
    Key {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct RewriteArgs {
    /// Files to rewrite; reads stdin when none are given
    pub files: Vec<PathBuf>,

    /// Write results back to the input files instead of stdout
    #[arg(long, requires = "files")]
    pub in_place: bool,

    /// Pause between files, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Destination repository id, recorded in logs
    #[arg(long)]
    pub repo_id: Option<u64>,

    /// How long to wait for pending uploads before giving up, in seconds
    #[arg(long, default_value_t = 300)]
    pub wait_secs: u64,
}
