use crate::error::TransportError;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("repochat/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the shared `reqwest::Client` used by every transport.
///
/// No overall request timeout is configured here: streamed exchanges are
/// bounded by their own deadline and unary calls set one per request.
pub fn create_client(user_agent: Option<&str>) -> Result<reqwest::Client, TransportError> {
    let mut headers = HeaderMap::new();
    let ua = user_agent.unwrap_or(DEFAULT_USER_AGENT);
    let ua = HeaderValue::from_str(ua)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(USER_AGENT, ua);

    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .default_headers(headers)
        .build()
        .map_err(|err| TransportError::Build(err.to_string()))
}
