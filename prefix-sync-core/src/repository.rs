//! Thin wrapper over the `git` binary for the sync driver's checkout.
//!
//! All commands run non-interactively in the checkout directory. Commit
//! identity is passed per command with `-c` and never written to the
//! repository's config.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::RepositoryError;

pub const BOT_NAME: &str = "Bot";
pub const BOT_EMAIL: &str = "bot@local.com";

/// Local checkout the driver works in.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    proxy_url: Option<String>,
}

/// What the pre-check found at the clone path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    /// Missing or empty directory; safe to clone into.
    Vacant,
    /// Non-empty directory holding a git work tree.
    WorkTree,
    /// Non-empty directory that is not a git work tree.
    Occupied,
}

pub fn inspect_checkout(path: &Path) -> Result<CheckoutState, RepositoryError> {
    if !path.exists() {
        return Ok(CheckoutState::Vacant);
    }
    if fs::read_dir(path)?.next().is_none() {
        return Ok(CheckoutState::Vacant);
    }
    // Must be the top of a work tree: a subdirectory of some other repository
    // is not our checkout.
    let output = Command::new("git")
        .arg("-C")
        .arg(path)
        .args(["rev-parse", "--show-toplevel"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;
    if !output.status.success() {
        return Ok(CheckoutState::Occupied);
    }
    let toplevel = fs::canonicalize(String::from_utf8_lossy(&output.stdout).trim())?;
    if toplevel == fs::canonicalize(path)? {
        Ok(CheckoutState::WorkTree)
    } else {
        Ok(CheckoutState::Occupied)
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

impl GitRepository {
    pub fn open(path: impl Into<PathBuf>, proxy_url: Option<String>) -> Self {
        Self {
            path: path.into(),
            proxy_url,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone `clone_url` into the checkout path, or reuse an existing checkout
    /// by switching to `base_branch` and fast-forwarding it.
    pub fn clone_or_reuse(
        clone_url: &str,
        path: impl Into<PathBuf>,
        base_branch: &str,
        proxy_url: Option<String>,
    ) -> Result<Self, RepositoryError> {
        let repo = Self::open(path, proxy_url);
        match inspect_checkout(&repo.path)? {
            CheckoutState::Vacant => {
                info!(path = %repo.path.display(), "Cloning repository");
                if let Some(parent) = repo.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut cmd = repo.command(None);
                cmd.arg("clone").arg(clone_url).arg(&repo.path);
                repo.run(cmd, "clone")?;
            }
            CheckoutState::WorkTree => {
                info!(path = %repo.path.display(), branch = base_branch, "Repository already exists, pulling latest");
                repo.git(&["checkout", base_branch])?;
                repo.git(&["pull", "--ff-only", "origin", base_branch])?;
            }
            CheckoutState::Occupied => {
                return Err(RepositoryError::NotARepository(repo.path.clone()));
            }
        }
        Ok(repo)
    }

    fn command(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(proxy) = &self.proxy_url {
            cmd.env("HTTPS_PROXY", proxy);
        }
        cmd
    }

    fn run(&self, mut cmd: Command, label: &str) -> Result<String, RepositoryError> {
        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(command = label, stderr = %stderr, "git command failed");
            return Err(RepositoryError::Git {
                command: label.to_string(),
                stderr,
            });
        }
        debug!(command = label, "git command succeeded");
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run `git <args>` inside the checkout.
    pub fn git(&self, args: &[&str]) -> Result<String, RepositoryError> {
        let mut cmd = self.command(Some(&self.path));
        cmd.args(args);
        self.run(cmd, &args.join(" "))
    }

    pub fn current_branch(&self) -> Result<String, RepositoryError> {
        Ok(self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])?
            .trim()
            .to_string())
    }

    pub fn create_branch(&self, branch: &str) -> Result<(), RepositoryError> {
        self.git(&["checkout", "-b", branch])?;
        info!(branch, "Checked out new branch");
        Ok(())
    }

    /// Content of `rel_path` at `HEAD`, or `None` when it is not tracked there.
    pub fn committed_content(&self, rel_path: &str) -> Result<Option<Vec<u8>>, RepositoryError> {
        let object = format!("HEAD:{rel_path}");
        let output = self.command(Some(&self.path)).args(["show", object.as_str()]).output()?;
        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }

    /// Whether `content` differs from the committed version of `rel_path`.
    pub fn differs_from_head(&self, rel_path: &str, content: &[u8]) -> Result<bool, RepositoryError> {
        let changed = match self.committed_content(rel_path)? {
            Some(committed) => sha256_hex(&committed) != sha256_hex(content),
            None => true,
        };
        debug!(file = rel_path, changed, "Compared file against HEAD");
        Ok(changed)
    }

    /// Stage and commit a single path as the bot identity.
    pub fn commit_file(&self, rel_path: &str, message: &str) -> Result<(), RepositoryError> {
        self.git(&["add", "--", rel_path])?;
        let name = format!("user.name={BOT_NAME}");
        let email = format!("user.email={BOT_EMAIL}");
        self.git(&[
            "-c",
            name.as_str(),
            "-c",
            email.as_str(),
            "commit",
            "-m",
            message,
            "--",
            rel_path,
        ])?;
        info!(file = rel_path, message, "Changes committed");
        Ok(())
    }

    pub fn push_upstream(&self, branch: &str) -> Result<(), RepositoryError> {
        self.git(&["push", "--set-upstream", "origin", branch])?;
        info!(branch, "Pushed branch");
        Ok(())
    }
}
