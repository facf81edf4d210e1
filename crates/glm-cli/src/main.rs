//! GitLab Migrate RS command line
//!
//! Rewrites attachment references in Markdown exported from GitLab issues and
//! comments, relocating the files as configured.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use glm_attachments::{relocation_key, scan, AttachmentRewriter, GitlabClient};
use glm_core::throttle;
use glm_core::MigrationConfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Command, RewriteArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Rewrite(args) => rewrite(cli.config.as_deref(), args).await,
        Command::Scan { file } => {
            let body = read_body(file.as_deref())?;
            let mut stdout = io::stdout().lock();
            for reference in scan(&body) {
                writeln!(stdout, "{}", serde_json::to_string(&reference)?)?;
            }
            Ok(())
        }
        Command::Key { paths } => {
            let mut stdout = io::stdout().lock();
            for path in paths {
                writeln!(stdout, "{}", relocation_key(&path))?;
            }
            Ok(())
        }
    }
}

/// Initialize tracing/logging. Logs go to stderr; stdout carries rewritten bodies.
fn init_tracing(json: bool) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,glm_attachments=debug,glm_cli=debug".into()),
    );

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MigrationConfig> {
    match path {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => MigrationConfig::from_env().context("failed to load configuration from environment"),
    }
}

fn read_body(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut body = String::new();
            io::stdin()
                .read_to_string(&mut body)
                .context("failed to read stdin")?;
            Ok(body)
        }
    }
}

async fn rewrite(config_path: Option<&Path>, args: RewriteArgs) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    info!(
        gitlab = %config.gitlab.url,
        project = %config.gitlab.project_path,
        relocation = config.destination.relocation_enabled(),
        "Starting attachment rewrite"
    );

    let gitlab = GitlabClient::new(&config.gitlab)?;
    let rewriter = AttachmentRewriter::from_config(&config)?;

    if args.files.is_empty() {
        let body = read_body(None)?;
        let rewritten = rewriter
            .rewrite_attachments(&body, args.repo_id, &config.destination, &gitlab)
            .await;
        io::stdout().lock().write_all(rewritten.as_bytes())?;
    } else {
        let delay = Duration::from_millis(args.delay_ms);
        for (index, file) in args.files.iter().enumerate() {
            if index > 0 {
                throttle::pause(delay).await;
            }
            rewrite_file(&rewriter, &config, &gitlab, file, &args).await?;
        }
    }

    if !rewriter.shutdown(Duration::from_secs(args.wait_secs)).await {
        bail!(
            "{} attachment uploads still pending after {}s",
            rewriter.pending_side_effects(),
            args.wait_secs
        );
    }

    let stats = rewriter.stats();
    info!(
        found = stats.found,
        relocated = stats.relocated,
        absolute = stats.absolute,
        skipped = stats.skipped,
        uploads_failed = stats.uploads_failed,
        local_writes_failed = stats.local_writes_failed,
        "Attachment rewrite finished"
    );
    if stats.skipped + stats.uploads_failed + stats.local_writes_failed > 0 {
        warn!("Some attachments were not relocated; see the errors above");
    }

    Ok(())
}

async fn rewrite_file(
    rewriter: &AttachmentRewriter,
    config: &MigrationConfig,
    gitlab: &GitlabClient,
    file: &Path,
    args: &RewriteArgs,
) -> anyhow::Result<()> {
    let body = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let rewritten = rewriter
        .rewrite_attachments(&body, args.repo_id, &config.destination, gitlab)
        .await;

    if args.in_place {
        if rewritten != body {
            tokio::fs::write(file, &rewritten)
                .await
                .with_context(|| format!("failed to write {}", file.display()))?;
            info!(file = %file.display(), "Rewrote attachment links");
        }
    } else {
        io::stdout().lock().write_all(rewritten.as_bytes())?;
    }

    Ok(())
}
