//! `load_config` module: builds the run's [`SyncConfig`] from an optional YAML
//! file, the process environment and, when configured, the secret store.
//!
//! This is the only place that reads environment variables. Everything below
//! it receives an explicit `SyncConfig`.
//!
//! # Precedence
//! 1. YAML file (non-secret settings only)
//! 2. Environment variables override the file
//! 3. With `SECRETS_DIR` set, tokens come from the secret store instead of
//!    `NETBOX_TOKEN`/`GIT_TOKEN`, and the no-proxy list is derived
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use prefix_sync_core::config::{
    GitConfig, InventoryConfig, NetworkConfig, SyncConfig, DEFAULT_BASE_BRANCH,
    DEFAULT_GITHUB_API_URL, DEFAULT_REPO_PATH,
};
use prefix_sync_core::secrets::{bootstrap, FileSecretStore};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Settings accepted in the YAML file. Secrets are never read from it.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    pub inventory_url: Option<String>,
    pub git_repo: Option<String>,
    pub git_repo_path: Option<PathBuf>,
    pub git_remote_url: Option<String>,
    pub github_api_url: Option<String>,
    pub base_branch: Option<String>,
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
    pub aws_region: Option<String>,
    pub secrets_dir: Option<PathBuf>,
    pub insecure_tls: Option<bool>,
}

fn read_static_config(path: &Path) -> Result<StaticConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path,
                e
            ));
        }
    };

    match serde_yaml::from_str::<Option<StaticConfig>>(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let file = match path {
        Some(path) => read_static_config(path)?,
        None => StaticConfig::default(),
    };

    let Some(base_url) = env_var("NETBOX_URL").or(file.inventory_url) else {
        error!("NETBOX_URL environment variable not set");
        bail!("NETBOX_URL is not set (environment or config file inventory_url)");
    };

    let git = GitConfig {
        repo: env_var("GIT_REPO").or(file.git_repo).unwrap_or_default(),
        repo_path: env_var("GIT_REPO_PATH")
            .map(PathBuf::from)
            .or(file.git_repo_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPO_PATH)),
        token: env_var("GIT_TOKEN").unwrap_or_default(),
        remote_url: env_var("GIT_REMOTE_URL").or(file.git_remote_url),
        api_url: env_var("GITHUB_API_URL")
            .or(file.github_api_url)
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
        base_branch: file
            .base_branch
            .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
    };

    let network = NetworkConfig {
        proxy_url: env_var("PROXY_URL").or(file.proxy_url),
        no_proxy: env_var("NO_PROXY")
            .map(|raw| split_list(&raw))
            .unwrap_or(file.no_proxy),
        insecure_tls: env_var("INSECURE_TLS")
            .map(|raw| parse_flag(&raw))
            .or(file.insecure_tls)
            .unwrap_or(false),
    };

    let mut config = SyncConfig {
        inventory: InventoryConfig {
            base_url,
            token: env_var("NETBOX_TOKEN").unwrap_or_default(),
        },
        git,
        network,
    };

    if let Some(dir) = env_var("SECRETS_DIR").map(PathBuf::from).or(file.secrets_dir) {
        info!(secrets_dir = %dir.display(), "Resolving tokens from secret store");
        let region = env_var("AWS_REGION").or(file.aws_region);
        config = bootstrap(config, region.as_deref(), &FileSecretStore::new(dir)).await;
    }

    config.trace_loaded();
    Ok(config)
}

/// Settings a full sync needs beyond what `render` needs.
pub fn validate_for_sync(config: &SyncConfig) -> Result<()> {
    if config.git.repo.is_empty() {
        error!("GIT_REPO environment variable not set");
        bail!("GIT_REPO is not set (expected org/repo)");
    }
    if config.git.remote_url.is_none() && config.git.token.is_empty() {
        error!("No git token available for the default clone URL");
        bail!("GIT_TOKEN is not set and no GIT_REMOTE_URL was given");
    }
    Ok(())
}
