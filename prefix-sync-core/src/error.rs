use std::path::PathBuf;
use thiserror::Error;

/// Failures of the request primitive that are not HTTP status errors.
///
/// A 4xx/5xx answer is not an error at this level; it comes back as a
/// [`crate::http::Response`] with a bumped `error_count`.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Incorrect and possibly insecure protocol in url: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP transport failure: {0}")]
    Transport(#[source] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Inventory query for lookup '{lookup}' failed: {source}")]
    Inventory {
        lookup: String,
        #[source]
        source: HttpError,
    },

    #[error("Inventory result for lookup '{lookup}' is malformed: {source}")]
    MalformedResult {
        lookup: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Inventory answered lookup '{lookup}' without a prefix listing: {payload}")]
    UnexpectedPayload { lookup: String, payload: String },

    #[error("Filters for lookup '{lookup}' are not a JSON object")]
    InvalidFilters { lookup: String },

    #[error("Invalid input descriptor {path}: {source}")]
    InvalidInput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0} exists, is not empty, and is not a git work tree")]
    NotARepository(PathBuf),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Failed to read secret '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Pull request creation failed: {0}")]
    PullRequest(#[source] HttpError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
