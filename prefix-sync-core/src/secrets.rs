//! Secret resolution and the bootstrap step that turns a partially filled
//! [`SyncConfig`] into a runnable one.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::contract::SecretStore;
use crate::error::SecretError;

pub const GIT_TOKEN_SECRET: &str = "GithubTOKEN";
pub const INVENTORY_TOKEN_SECRET: &str = "NetboxTOKEN";

/// Secrets mounted as files, one file per secret name.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>, SecretError> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SecretError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }
}

/// Secret as UTF-8 text with surrounding whitespace trimmed. Missing or
/// unreadable secrets are logged and come back empty.
pub async fn resolve_secret<S>(store: &S, name: &str) -> String
where
    S: SecretStore + ?Sized,
{
    match store.get_secret(name).await {
        Ok(Some(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(secret = name, error = %e, "Secret irretrievable: not valid UTF-8");
                String::new()
            }
        },
        Ok(None) => {
            warn!(secret = name, "Secret irretrievable: not found");
            String::new()
        }
        Err(e) => {
            warn!(secret = name, error = %e, "Secret irretrievable");
            String::new()
        }
    }
}

pub fn secret_store_endpoint(region: &str) -> String {
    format!("https://secretsmanager.{region}.amazonaws.com")
}

fn host_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

/// Fill in tokens from the secret store and derive the proxy exclusions.
///
/// The no-proxy list covers the secret-store endpoint for `region` and the
/// inventory host, which are reached directly.
pub async fn bootstrap<S>(mut config: SyncConfig, region: Option<&str>, store: &S) -> SyncConfig
where
    S: SecretStore + ?Sized,
{
    config.git.token = resolve_secret(store, GIT_TOKEN_SECRET).await;
    config.inventory.token = resolve_secret(store, INVENTORY_TOKEN_SECRET).await;

    let mut no_proxy = Vec::new();
    if let Some(region) = region {
        let endpoint = secret_store_endpoint(region);
        no_proxy.push(host_of(&endpoint).to_string());
    }
    let inventory_host = host_of(&config.inventory.base_url);
    if !inventory_host.is_empty() {
        no_proxy.push(inventory_host.to_string());
    }
    for existing in std::mem::take(&mut config.network.no_proxy) {
        if !no_proxy.contains(&existing) {
            no_proxy.push(existing);
        }
    }
    config.network.no_proxy = no_proxy;

    info!(
        git_token_set = !config.git.token.is_empty(),
        inventory_token_set = !config.inventory.token.is_empty(),
        no_proxy = ?config.network.no_proxy,
        "Bootstrap resolved secrets"
    );
    config
}
