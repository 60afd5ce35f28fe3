//! # prefix-sync CLI Interface (Module)
//!
//! Command parsing and the async entrypoint. All pipeline logic lives in
//! [`prefix-sync-core`]; this module loads configuration, builds the real
//! clients and hands them to the core.
//!
//! Running the binary without a subcommand performs `sync` with settings from
//! the environment only.
//!
//! [`prefix-sync-core`]: ../../prefix-sync-core/
use crate::load_config::{load_config, validate_for_sync};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prefix_sync_core::github::GithubClient;
use prefix_sync_core::http::HttpClient;
use prefix_sync_core::inventory::NetboxClient;
use prefix_sync_core::output::{build_list_output, read_input, render_output};
use prefix_sync_core::synchronise::{output_names, synchronise};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// CLI for prefix-sync: publish NetBox prefixes as Terraform JSON via pull request.
#[derive(Parser)]
#[clap(
    name = "prefix-sync",
    version,
    about = "Synchronise NetBox IP prefixes into a git repository and open a pull request"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render every input file, commit changed outputs and open a pull request
    Sync {
        /// Optional YAML file with non-secret settings
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Build the output document for a single input file and print it
    Render {
        /// Input descriptor (JSON with a `lookup_prefixes` map)
        #[clap(long)]
        input: PathBuf,
        /// Optional YAML file with non-secret settings
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("run_started");

    match cli.command.unwrap_or(Commands::Sync { config: None }) {
        Commands::Sync { config } => run_sync(config.as_deref()).await,
        Commands::Render { input, config } => run_render(&input, config.as_deref()).await,
    }
}

fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?
        .as_secs())
}

async fn run_sync(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;
    validate_for_sync(&config)?;

    let http = HttpClient::new(&config.network)?;
    let inventory = NetboxClient::new(http.clone(), &config.inventory);
    let github = GithubClient::new(http, &config.git);

    tracing::info!(command = "sync", "Starting synchronisation");
    match synchronise(&config, &inventory, &github, unix_now()?).await {
        Ok(report) => {
            tracing::info!(
                command = "sync",
                branch = %report.branch,
                files = report.files.len(),
                commits = report.commits,
                pull_request_status = ?report.pull_request_status,
                "Synchronisation complete"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "sync", error = %e, "Synchronisation failed");
            Err(anyhow::Error::new(e))
        }
    }
}

async fn run_render(input: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;
    let http = HttpClient::new(&config.network)?;
    let inventory = NetboxClient::new(http, &config.inventory);

    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (stem, _) = output_names(file_name)
        .with_context(|| format!("Input file {} does not end in .json", input.display()))?;

    let descriptor = read_input(input)?;
    let document = build_list_output(&inventory, &descriptor, &stem).await?;
    tracing::info!(command = "render", lookups = document.len(), "Rendered output document");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&render_output(&document)?)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
