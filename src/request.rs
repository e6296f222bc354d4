use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::{ApiCallError, ClientConfig, Result};

/// HTTP method of a call binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Upper-case HTTP method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Transport passthrough settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawOptions {
    /// Per-request timeout. No timeout when `None`.
    pub timeout: Option<Duration>,
    /// Applied after default and per-call headers.
    pub headers: BTreeMap<String, String>,
}

/// Per-call binding: what to request and how the controller should treat it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOptions {
    pub path: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    /// Poll interval. Zero or `None` disables polling.
    pub refresh: Option<Duration>,
    /// Cache lifetime. Zero or `None` disables caching.
    pub ttl: Option<Duration>,
    pub raw: RawOptions,
}

impl CallOptions {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            ..Self::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn refresh(mut self, interval: Duration) -> Self {
        self.refresh = Some(interval);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.raw.timeout = Some(timeout);
        self
    }

    pub(crate) fn poll_interval(&self) -> Option<Duration> {
        self.refresh.filter(|interval| !interval.is_zero())
    }

    pub(crate) fn cache_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|ttl| !ttl.is_zero())
    }
}

/// Fully merged request handed to a [`Transport`](crate::Transport).
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// `base_url` joined with the call path, without query string.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    /// Merges client defaults under the call's own settings. Per-call values
    /// win on key collisions.
    pub fn from_call(config: &ClientConfig, options: &CallOptions) -> Self {
        let mut headers = config.default_headers.clone();
        headers.extend(options.headers.clone());
        headers.extend(options.raw.headers.clone());

        let mut query = config.default_query_params.clone();
        query.extend(options.query_params.clone());

        Self {
            method: options.method,
            url: join_url(&config.base_url, &options.path),
            headers,
            query,
            body: options.body.clone(),
            timeout: options.raw.timeout,
        }
    }

    /// Parses the URL and appends the query parameters.
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|err| ApiCallError::InvalidUrl(format!("{}: {err}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// Joins base and path with exactly one `/` between them. Absolute paths
/// are used as-is.
fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() || path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    if path.is_empty() {
        return base.to_owned();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{join_url, CallOptions, Method, TransportRequest};
    use crate::{ApiCallError, ClientConfig};

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://api.test/", "/v1/items"), "https://api.test/v1/items");
        assert_eq!(join_url("https://api.test", "v1/items"), "https://api.test/v1/items");
        assert_eq!(join_url("", "https://other.test/x"), "https://other.test/x");
        assert_eq!(join_url("https://api.test", "https://other.test/x"), "https://other.test/x");
    }

    #[test]
    fn per_call_values_override_defaults() {
        let config = ClientConfig::new("https://api.test")
            .default_header("x-client", "default")
            .default_header("accept", "application/json")
            .default_query_param("lang", "en")
            .default_query_param("page", "1");
        let options = CallOptions::post("/items", json!({"name": "kit"}))
            .header("x-client", "call")
            .query("page", "2")
            .timeout(Duration::from_secs(5));

        let request = TransportRequest::from_call(&config, &options);

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.headers["x-client"], "call");
        assert_eq!(request.headers["accept"], "application/json");
        assert_eq!(request.query["lang"], "en");
        assert_eq!(request.query["page"], "2");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert_eq!(request.body, Some(json!({"name": "kit"})));

        let url = request.full_url().expect("url must parse");
        assert_eq!(url.as_str(), "https://api.test/items?lang=en&page=2");
    }

    #[test]
    fn raw_headers_apply_last() {
        let config = ClientConfig::new("https://api.test").default_header("x-trace", "a");
        let mut options = CallOptions::get("/items").header("x-trace", "b");
        options.raw.headers.insert("x-trace".to_owned(), "c".to_owned());

        let request = TransportRequest::from_call(&config, &options);
        assert_eq!(request.headers["x-trace"], "c");
    }

    #[test]
    fn invalid_url_is_deferred_to_full_url() {
        let config = ClientConfig::new("not a url");
        let request = TransportRequest::from_call(&config, &CallOptions::get("/items"));
        assert!(matches!(request.full_url(), Err(ApiCallError::InvalidUrl(_))));
    }

    #[test]
    fn zero_intervals_disable_polling_and_caching() {
        let options = CallOptions::get("/items")
            .refresh(Duration::ZERO)
            .ttl(Duration::ZERO);
        assert_eq!(options.poll_interval(), None);
        assert_eq!(options.cache_ttl(), None);
    }
}
