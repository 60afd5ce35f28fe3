//! Minimal HTTP request/response primitive.
//!
//! Every outbound call (NetBox, GitHub) goes through [`HttpClient::request`].
//! A [`Request`] is shaped by [`Request::prepare`] before any I/O happens, so
//! the request-shaping rules can be exercised without a server:
//!
//! - only `http`/`https` URLs are accepted,
//! - the method is upper-cased,
//! - `Accept: application/json` is the default and caller headers override it,
//! - GET folds `data` into the query string and never sends a body,
//! - params are percent-encoded with `+` for space and `/` left as is,
//! - body data is JSON by default, or form-encoded on request.
//!
//! HTTP 4xx/5xx answers are returned as a [`Response`] with `error_count`
//! incremented and the status's reason phrase as body; only transport faults
//! surface as [`HttpError`].

use std::sync::OnceLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::error::HttpError;

/// Unreserved characters plus `/` stay literal in query strings.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Completed (or HTTP-failed) request. Immutable once built.
#[derive(Debug, Clone)]
pub struct Response {
    body: String,
    headers: Vec<(String, String)>,
    status: u16,
    error_count: u32,
    json: OnceLock<Value>,
}

impl Response {
    pub fn new(
        body: impl Into<String>,
        headers: Vec<(String, String)>,
        status: u16,
        error_count: u32,
    ) -> Self {
        Self {
            body: body.into(),
            headers,
            status,
            error_count,
            json: OnceLock::new(),
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Body decoded as JSON on first use. A body that is not JSON decodes to
    /// the empty string value.
    pub fn json(&self) -> &Value {
        self.json.get_or_init(|| {
            serde_json::from_str(&self.body).unwrap_or_else(|e| {
                debug!(error = %e, status = self.status, "Response body is not JSON");
                Value::String(String::new())
            })
        })
    }
}

/// Body of a prepared request.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(String),
    Form(Vec<(String, String)>),
}

/// Request after all shaping rules have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
    pub error_count: u32,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    url: String,
    method: String,
    data: Map<String, Value>,
    params: Map<String, Value>,
    headers: Vec<(String, String)>,
    data_as_json: bool,
    error_count: u32,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            data: Map::new(),
            params: Map::new(),
            headers: Vec::new(),
            data_as_json: true,
            error_count: 0,
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send `data` form-url-encoded instead of as JSON.
    pub fn data_as_form(mut self) -> Self {
        self.data_as_json = false;
        self
    }

    /// Prior HTTP error count, carried into the response.
    pub fn error_count(mut self, error_count: u32) -> Self {
        self.error_count = error_count;
        self
    }

    pub fn prepare(self) -> Result<PreparedRequest, HttpError> {
        if !self.url.starts_with("http") {
            return Err(HttpError::UnsupportedScheme(self.url));
        }
        let method = self.method.to_uppercase();

        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        for (name, value) in self.headers {
            set_header(&mut headers, name, value);
        }

        let mut params = self.params;
        let mut data = self.data;
        if method == "GET" {
            params.extend(std::mem::take(&mut data));
        }

        let mut url = self.url;
        if !params.is_empty() {
            let pairs: Vec<(String, String)> = params
                .iter()
                .flat_map(|(k, v)| value_pairs(k, v))
                .collect();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&encode_query(&pairs));
        }

        let body = if data.is_empty() {
            None
        } else if self.data_as_json {
            set_header(
                &mut headers,
                "Content-Type".to_string(),
                JSON_CONTENT_TYPE.to_string(),
            );
            Some(Body::Json(serde_json::to_string(&Value::Object(data))?))
        } else {
            Some(Body::Form(
                data.iter().flat_map(|(k, v)| value_pairs(k, v)).collect(),
            ))
        };

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
            error_count: self.error_count,
        })
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
    headers.push((name, value));
}

/// Text form of a scalar query/form value.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One pair per scalar, one pair per element for arrays.
pub(crate) fn value_pairs(key: &str, value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| (key.to_string(), scalar_text(item)))
            .collect(),
        other => vec![(key.to_string(), scalar_text(other))],
    }
}

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Shared reqwest client configured from [`NetworkConfig`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(network: &NetworkConfig) -> Result<Self, HttpError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);

        match &network.proxy_url {
            Some(proxy_url) => {
                let no_proxy = reqwest::NoProxy::from_string(&network.no_proxy.join(","));
                let proxy = reqwest::Proxy::https(proxy_url)
                    .map_err(HttpError::Client)?
                    .no_proxy(no_proxy);
                debug!(proxy = %proxy_url, no_proxy = ?network.no_proxy, "Using HTTPS proxy");
                builder = builder.proxy(proxy);
            }
            None => builder = builder.no_proxy(),
        }

        if network.insecure_tls {
            warn!("TLS certificate verification is DISABLED for all outbound requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder.build().map_err(HttpError::Client)?;
        Ok(Self { inner })
    }

    pub async fn request(&self, request: Request) -> Result<Response, HttpError> {
        let prepared = request.prepare()?;
        let method = Method::from_bytes(prepared.method.as_bytes())
            .map_err(|_| HttpError::InvalidMethod(prepared.method.clone()))?;

        debug!(method = %method, url = %prepared.url, "Sending HTTP request");
        let mut builder = self.inner.request(method, &prepared.url);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &prepared.body {
            Some(Body::Json(text)) => builder.body(text.clone()),
            Some(Body::Form(pairs)) => builder.form(pairs),
            None => builder,
        };

        let response = builder.send().await.map_err(HttpError::Transport)?;
        let status = response.status();
        let headers = collect_headers(response.headers());

        if status.is_client_error() || status.is_server_error() {
            // reqwest does not surface the phrase from the status line, so the
            // body is the standard phrase, or the bare code when there is none.
            let reason = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string());
            warn!(
                status = status.as_u16(),
                reason = %reason,
                error_count = prepared.error_count + 1,
                "HTTP error response"
            );
            return Ok(Response::new(
                reason,
                headers,
                status.as_u16(),
                prepared.error_count + 1,
            ));
        }

        let body = response.text().await.map_err(HttpError::Transport)?;
        debug!(status = status.as_u16(), bytes = body.len(), "HTTP response received");
        Ok(Response::new(
            body,
            headers,
            status.as_u16(),
            prepared.error_count,
        ))
    }
}
