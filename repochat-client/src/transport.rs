use crate::error::TransportError;
use crate::request::Request;
use crate::request::Response;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::HeaderMap;
use http::StatusCode;
use tracing::Level;
use tracing::enabled;
use tracing::trace;

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

pub struct StreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The seam every HTTP call goes through.
///
/// Both methods turn a non-success status into [`TransportError::Http`] with
/// the response body already read, so callers classify failures from one
/// shape regardless of whether the exchange was unary or streamed.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, req: Request) -> Result<Response, TransportError>;
    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, req: Request) -> reqwest::RequestBuilder {
        let Request {
            method,
            url,
            headers,
            body,
            timeout,
        } = req;

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }

    fn trace_request(req: &Request) {
        if enabled!(Level::TRACE) {
            trace!(
                "{} to {}: {}",
                req.method,
                req.url,
                req.body.as_ref().map(ToString::to_string).unwrap_or_default()
            );
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        Self::trace_request(&req);

        let url = req.url.clone();
        let resp = self.build(req).send().await.map_err(Self::map_error)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(Self::map_error)?;
        if !status.is_success() {
            let body = String::from_utf8(bytes.to_vec()).ok();
            return Err(TransportError::Http {
                status,
                url: Some(url),
                headers: Some(headers),
                body,
            });
        }
        Ok(Response {
            status,
            headers,
            body: bytes,
        })
    }

    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError> {
        Self::trace_request(&req);

        let url = req.url.clone();
        let resp = self.build(req).send().await.map_err(Self::map_error)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if !status.is_success() {
            let body = resp.text().await.ok().filter(|body| !body.is_empty());
            return Err(TransportError::Http {
                status,
                url: Some(url),
                headers: Some(headers),
                body,
            });
        }
        let stream = resp
            .bytes_stream()
            .map(|result| result.map_err(Self::map_error));
        Ok(StreamResponse {
            status,
            headers,
            bytes: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use http::Method;
    use pretty_assertions::assert_eq;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_json;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn stream_yields_body_bytes_on_success() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/ask"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(serde_json::json!({"question": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let req = Request::new(Method::POST, format!("{}/chat/ask", server.uri()))
            .with_json(&serde_json::json!({"question": "hi"}))
            .with_header(
                http::header::AUTHORIZATION,
                http::HeaderValue::from_static("Bearer tok"),
            );
        let mut resp = transport().stream(req).await?;
        assert_eq!(resp.status, StatusCode::OK);

        let mut body = Vec::new();
        while let Some(chunk) = resp.bytes.next().await {
            body.extend_from_slice(&chunk?);
        }
        assert_eq!(String::from_utf8(body)?, "hello world");
        Ok(())
    }

    #[tokio::test]
    async fn stream_reports_status_and_body_for_errors() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/ask"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(serde_json::json!({"detail": "slow down"})),
            )
            .mount(&server)
            .await;

        let req = Request::new(Method::POST, format!("{}/chat/ask", server.uri()));
        let err = match transport().stream(req).await {
            Ok(resp) => panic!("expected an error, got {resp:?}"),
            Err(err) => err,
        };

        match err {
            TransportError::Http { status, body, .. } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body.as_deref(), Some(r#"{"detail":"slow down"}"#));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn execute_returns_full_body() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repo/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let req = Request::new(Method::GET, format!("{}/repo/list", server.uri()));
        let resp = transport().execute(req).await?;

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body.as_ref(), b"[]");
        Ok(())
    }

    #[tokio::test]
    async fn execute_maps_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let req = Request::new(Method::GET, format!("{}/slow", server.uri()))
            .with_timeout(std::time::Duration::from_millis(20));
        let result = transport().execute(req).await;

        assert!(
            matches!(result, Err(TransportError::Timeout)),
            "expected timeout, got {result:?}"
        );
    }
}
