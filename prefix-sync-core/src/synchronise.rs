//! High-level pipeline: checkout → branch → render every input file → commit → push → PR.
//!
//! One run works on one checkout and one branch:
//!   - Clones the configured repository, or reuses an existing checkout at the
//!     clone path after switching to the base branch and pulling it
//!   - Creates `{unix_timestamp}_auto_update` from the base branch
//!   - For each `input/*.json` descriptor, queries the inventory through
//!     [`output::build_list_output`] and writes `output/<name>.tf.json`
//!   - Commits each output file whose content differs from `HEAD`, one commit per file
//!   - When anything was committed, pushes the branch and asks the hosting
//!     service for a pull request into the base branch
//!
//! # Error Handling
//! The first failing step aborts the run. Nothing is rolled back: the branch,
//! any commits already made, and the checkout stay as they were left.
//! A pull request answer with an HTTP error status is logged, not raised.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{Inventory, PullRequests};
use crate::error::SyncError;
use crate::output;
use crate::repository::GitRepository;

pub const INPUT_DIR: &str = "input";
pub const OUTPUT_DIR: &str = "output";

#[derive(Debug)]
pub struct SynchroniseReport {
    pub branch: String,
    pub files: Vec<FileReport>,
    pub commits: usize,
    /// Status of the pull request response, when one was requested.
    pub pull_request_status: Option<u16>,
}

#[derive(Debug)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub lookups: usize,
    pub committed: bool,
}

pub fn branch_name(run_timestamp: u64) -> String {
    format!("{run_timestamp}_auto_update")
}

/// `site.json` → (`site`, `site.tf.json`).
pub fn output_names(input_name: &str) -> Option<(String, String)> {
    let stem = input_name.strip_suffix(".json")?;
    Some((stem.to_string(), format!("{stem}.tf.json")))
}

/// `*.json` files directly under `dir`, sorted by name.
pub fn input_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let io_err = |source| SyncError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let is_json = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(".json"))
            .unwrap_or(false);
        if path.is_file() && is_json {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub async fn synchronise<I, P>(
    config: &SyncConfig,
    inventory: &I,
    pulls: &P,
    run_timestamp: u64,
) -> Result<SynchroniseReport, SyncError>
where
    I: Inventory + ?Sized,
    P: PullRequests + ?Sized,
{
    let git = &config.git;
    info!(repo = %git.repo, path = %git.repo_path.display(), "[SYNC] Preparing checkout");
    let repo = GitRepository::clone_or_reuse(
        &git.clone_url(),
        git.repo_path.clone(),
        &git.base_branch,
        config.network.proxy_url.clone(),
    )?;

    let branch = branch_name(run_timestamp);
    repo.create_branch(&branch)?;
    info!(branch = %repo.current_branch()?, "[SYNC] Checked out working branch");

    let input_dir = repo.path().join(INPUT_DIR);
    let output_dir = repo.path().join(OUTPUT_DIR);
    fs::create_dir_all(&output_dir).map_err(|source| SyncError::Io {
        path: output_dir.clone(),
        source,
    })?;

    let mut files = Vec::new();
    let mut commits = 0usize;

    for input_path in input_files(&input_dir)? {
        let Some((stem, output_name)) = input_path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(output_names)
        else {
            continue;
        };
        info!(file = %input_path.display(), "[SYNC] Processing input file");

        let descriptor = output::read_input(&input_path)?;
        let document = output::build_list_output(inventory, &descriptor, &stem).await?;
        let output_path = output_dir.join(&output_name);
        let rendered = output::write_output(&output_path, &document)?;

        let rel_path = format!("{OUTPUT_DIR}/{output_name}");
        let committed = if repo.differs_from_head(&rel_path, &rendered)? {
            repo.commit_file(&rel_path, &format!("Update {output_name}"))?;
            commits += 1;
            true
        } else {
            info!(file = %rel_path, "[SYNC] No changes to commit");
            false
        };

        files.push(FileReport {
            input: input_path,
            output: output_path,
            lookups: document.len(),
            committed,
        });
    }

    let mut pull_request_status = None;
    if commits > 0 {
        info!(branch = %branch, commits, "[SYNC] Pushing changes");
        repo.push_upstream(&branch)?;

        info!(branch = %branch, "[SYNC] Creating pull request");
        let response = pulls
            .open_pull_request(&branch, &git.base_branch)
            .await
            .map_err(|e| {
                error!(error = %e, "[SYNC][ERROR] Pull request request failed");
                SyncError::PullRequest(e)
            })?;
        if response.error_count() > 0 {
            warn!(status = response.status(), body = response.body(), "[SYNC] Pull request was not created");
        } else {
            info!(status = response.status(), "[SYNC] Pull request created");
        }
        pull_request_status = Some(response.status());
    } else {
        info!("[SYNC] Nothing committed, skipping push and pull request");
    }

    Ok(SynchroniseReport {
        branch,
        files,
        commits,
        pull_request_status,
    })
}
