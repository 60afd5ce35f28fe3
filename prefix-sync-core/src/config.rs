use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_REPO_PATH: &str = "/tmp/git_repo";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BASE_BRANCH: &str = "main";

/// Everything a sync run needs, built once by the caller and passed down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub inventory: InventoryConfig,
    pub git: GitConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub token: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// `org/repo` on the hosting service.
    pub repo: String,
    #[serde(default = "default_repo_path")]
    pub repo_path: PathBuf,
    #[serde(default, skip_serializing)]
    pub token: String,
    /// Clone URL to use verbatim instead of the token-embedded GitHub URL.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
    /// Disables TLS certificate and hostname verification.
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(DEFAULT_REPO_PATH)
}

fn default_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

fn default_base_branch() -> String {
    DEFAULT_BASE_BRANCH.to_string()
}

impl GitConfig {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            repo_path: default_repo_path(),
            token: String::new(),
            remote_url: None,
            api_url: default_api_url(),
            base_branch: default_base_branch(),
        }
    }

    /// URL handed to `git clone`. Contains the token unless `remote_url` is set,
    /// so it must never be logged.
    pub fn clone_url(&self) -> String {
        match &self.remote_url {
            Some(url) => url.clone(),
            None => format!("https://{}@github.com/{}.git", self.token, self.repo),
        }
    }
}

// Manual Debug impls keep tokens out of logs.
impl std::fmt::Debug for InventoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryConfig")
            .field("base_url", &self.base_url)
            .field("token_set", &!self.token.is_empty())
            .finish()
    }
}

impl std::fmt::Debug for GitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitConfig")
            .field("repo", &self.repo)
            .field("repo_path", &self.repo_path)
            .field("token_set", &!self.token.is_empty())
            .field("remote_url", &self.remote_url)
            .field("api_url", &self.api_url)
            .field("base_branch", &self.base_branch)
            .finish()
    }
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            inventory_url = %self.inventory.base_url,
            inventory_token_set = !self.inventory.token.is_empty(),
            repo = %self.git.repo,
            repo_path = %self.git.repo_path.display(),
            git_token_set = !self.git.token.is_empty(),
            proxy = self.network.proxy_url.as_deref().unwrap_or("none"),
            insecure_tls = self.network.insecure_tls,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
