//! NetBox prefix queries.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::InventoryConfig;
use crate::contract::{Filters, Inventory};
use crate::error::HttpError;
use crate::http::{scalar_text, HttpClient, Request};

pub const PREFIXES_PATH: &str = "/api/ipam/prefixes/";

pub struct NetboxClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl NetboxClient {
    pub fn new(http: HttpClient, config: &InventoryConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    pub fn prefixes_url(&self, filters: &Filters) -> String {
        prefixes_url(&self.base_url, filters)
    }
}

/// `k=v` pairs joined by `&`, values interpolated verbatim. Array values repeat
/// the key once per element.
pub fn filter_query(filters: &Filters) -> String {
    filters
        .iter()
        .flat_map(|(k, v)| match v {
            Value::Array(items) => items
                .iter()
                .map(|item| format!("{k}={}", scalar_text(item)))
                .collect::<Vec<_>>(),
            other => vec![format!("{k}={}", scalar_text(other))],
        })
        .collect::<Vec<_>>()
        .join("&")
}

pub fn prefixes_url(base_url: &str, filters: &Filters) -> String {
    format!(
        "{}{}?{}",
        base_url.trim_end_matches('/'),
        PREFIXES_PATH,
        filter_query(filters)
    )
}

#[async_trait]
impl Inventory for NetboxClient {
    async fn get_prefixes(&self, filters: &Filters) -> Result<Value, HttpError> {
        let url = self.prefixes_url(filters);
        info!(url = %url, "Querying NetBox prefixes");
        let response = self
            .http
            .request(Request::new(url).header("Authorization", format!("Token {}", self.token)))
            .await?;
        if response.error_count() > 0 {
            warn!(
                status = response.status(),
                body = response.body(),
                "NetBox prefix query returned an HTTP error"
            );
        }
        let payload = response.json().clone();
        debug!(count = ?payload.get("count"), "NetBox prefix query decoded");
        Ok(payload)
    }
}
