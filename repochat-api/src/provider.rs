use http::Method;
use http::header::HeaderMap;
use repochat_client::Request;
use repochat_client::RetryOn;
use repochat_client::RetryPolicy;
use std::time::Duration;

/// Retry settings for unary backend calls.
///
/// Converted into a [`RetryPolicy`] for `repochat-client`. The streamed
/// question exchange never consults it.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub retry_429: bool,
    pub retry_5xx: bool,
    pub retry_transport: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            retry_429: false,
            retry_5xx: true,
            retry_transport: true,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            retry_on: RetryOn {
                retry_429: self.retry_429,
                retry_5xx: self.retry_5xx,
                retry_transport: self.retry_transport,
            },
        }
    }
}

/// Where the backend lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub headers: HeaderMap,
    pub retry: RetryConfig,
    /// Per-request timeout for unary calls and the default deadline of a
    /// streamed exchange.
    pub request_timeout: Duration,
}

impl Provider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            name: "repochat".to_string(),
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(180),
        }
    }

    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    /// Like [`Provider::url_for_path`] with a percent-encoded query string.
    pub fn url_with_query(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = self.url_for_path(path);
        if !query.is_empty() {
            let qs = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&qs);
        }
        url
    }

    pub fn build_request(&self, method: Method, url: String) -> Request {
        let mut req = Request::new(method, url);
        req.headers = self.headers.clone();
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn joins_paths_without_doubling_slashes() {
        let provider = Provider::new("http://127.0.0.1:8000/api/v1/");
        assert_eq!(
            provider.url_for_path("/chat/ask"),
            "http://127.0.0.1:8000/api/v1/chat/ask"
        );
        assert_eq!(provider.url_for_path(""), "http://127.0.0.1:8000/api/v1");
    }

    #[test]
    fn encodes_query_parameters() {
        let provider = Provider::new("http://localhost/api/v1");
        assert_eq!(
            provider.url_with_query("chat/history", &[("user_id", "u 1"), ("repo_name", "a&b")]),
            "http://localhost/api/v1/chat/history?user_id=u+1&repo_name=a%26b"
        );
    }

    #[test]
    fn default_retry_never_retries_rate_limits() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy.max_attempts, 3);
        assert!(!policy.retry_on.retry_429);
        assert!(policy.retry_on.retry_5xx);
    }
}
