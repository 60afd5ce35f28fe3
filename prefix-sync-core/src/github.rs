use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::GitConfig;
use crate::contract::PullRequests;
use crate::error::HttpError;
use crate::http::{HttpClient, Request, Response};

pub const PR_TITLE: &str = "Automatic Prefix Merge";
pub const PR_BODY: &str = "Automatically created PR by prefix-sync";
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Opens pull requests through the GitHub REST API.
pub struct GithubClient {
    http: HttpClient,
    api_url: String,
    repo: String,
    token: String,
}

impl GithubClient {
    pub fn new(http: HttpClient, config: &GitConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token: config.token.clone(),
        }
    }

    pub fn pulls_url(&self) -> String {
        format!("{}/repos/{}/pulls", self.api_url, self.repo)
    }
}

pub fn pull_request_body(head: &str, base: &str) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("title".to_string(), Value::from(PR_TITLE));
    body.insert("head".to_string(), Value::from(head));
    body.insert("base".to_string(), Value::from(base));
    body.insert("body".to_string(), Value::from(PR_BODY));
    body
}

#[async_trait]
impl PullRequests for GithubClient {
    async fn open_pull_request(&self, head: &str, base: &str) -> Result<Response, HttpError> {
        info!(repo = %self.repo, head, base, "Creating pull request");
        let request = Request::new(self.pulls_url())
            .method("POST")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .data(pull_request_body(head, base));
        self.http.request(request).await
    }
}
