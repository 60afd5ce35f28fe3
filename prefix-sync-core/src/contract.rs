//! # contract: seams between the sync pipeline and its external collaborators
//!
//! The pipeline talks to three outside systems: the NetBox inventory, the git
//! hosting service's pull request API, and a secret store. Each sits behind a
//! trait here so the driver can be exercised against mocks.
//!
//! - [`Inventory`]: prefix queries, implemented by [`crate::inventory::NetboxClient`].
//! - [`PullRequests`]: PR creation, implemented by [`crate::github::GithubClient`].
//! - [`SecretStore`]: named secret lookup, implemented by [`crate::secrets::FileSecretStore`].
//!
//! The traits are annotated for `mockall`; the generated `Mock*` types are
//! exported under the `test-export-mocks` feature for use by dependent crates.

use async_trait::async_trait;
use mockall::automock;
use serde_json::{Map, Value};

use crate::error::{HttpError, SecretError};
use crate::http::Response;

/// Filter map sent to the inventory's prefix listing.
pub type Filters = Map<String, Value>;

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Query the prefix listing with the given filters and return the decoded
    /// JSON payload (the empty string value when the body is not JSON).
    async fn get_prefixes(&self, filters: &Filters) -> Result<Value, HttpError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PullRequests: Send + Sync {
    /// Request a pull request merging `head` into `base`.
    async fn open_pull_request(&self, head: &str, base: &str) -> Result<Response, HttpError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Raw secret value, or `None` when no secret with that name exists.
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>, SecretError>;
}
