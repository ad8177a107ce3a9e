use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use http::Method;
use http::StatusCode;
use pretty_assertions::assert_eq;
use repochat_api::ApiError;
use repochat_api::AskClient;
use repochat_api::AskRequest;
use repochat_api::CancellationController;
use repochat_api::Provider;
use repochat_api::StaticAuth;
use repochat_api::StreamConsumer;
use repochat_api::TimeoutOrigin;
use repochat_api::error::CLIENT_TIMEOUT_MESSAGE;
use repochat_api::error::GENERIC_ERROR_MESSAGE;
use repochat_api::error::MISSING_SESSION_MESSAGE;
use repochat_api::error::SERVER_TIMEOUT_MESSAGE;
use repochat_client::HttpTransport;
use repochat_client::Request;
use repochat_client::Response;
use repochat_client::StreamResponse;
use repochat_client::TransportError;

/// How the fixture answers the one streamed request it receives.
enum Script {
    Body {
        chunks: Vec<Result<Bytes, TransportError>>,
        /// Keep the body open forever after the scripted chunks.
        stall: bool,
    },
    Status {
        status: StatusCode,
        body: Option<String>,
    },
    /// Never send response headers.
    Hang,
}

#[derive(Clone)]
struct FixtureTransport {
    script: Arc<Mutex<Option<Script>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl FixtureTransport {
    fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(Some(script))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::new(Script::Body {
            chunks: chunks.into_iter().map(|chunk| Ok(chunk.into())).collect(),
            stall: false,
        })
    }

    fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .clone()
    }
}

#[async_trait]
impl HttpTransport for FixtureTransport {
    async fn execute(&self, _req: Request) -> Result<Response, TransportError> {
        Err(TransportError::Build("execute should not run".to_string()))
    }

    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .push(req);
        let script = self
            .script
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .take()
            .unwrap_or_else(|| panic!("fixture transport used twice"));

        match script {
            Script::Hang => futures::future::pending().await,
            Script::Status { status, body } => Err(TransportError::Http {
                status,
                url: None,
                headers: Some(HeaderMap::new()),
                body,
            }),
            Script::Body { chunks, stall } => {
                let scripted = futures::stream::iter(chunks);
                let bytes = if stall {
                    scripted.chain(futures::stream::pending()).boxed()
                } else {
                    scripted.boxed()
                };
                Ok(StreamResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    bytes,
                })
            }
        }
    }
}

fn request() -> Request {
    Request::new(Method::POST, "http://backend.test/api/v1/chat/ask".to_string())
}

async fn collect(
    transport: FixtureTransport,
    deadline: Duration,
) -> (Vec<String>, Result<repochat_api::StreamSummary, ApiError>) {
    let consumer = StreamConsumer::new(transport);
    let mut fragments = Vec::new();
    let result = consumer
        .consume(request(), deadline, |text| fragments.push(text.to_string()))
        .await;
    (fragments, result)
}

#[tokio::test]
async fn fragments_arrive_in_order_and_concatenate() {
    let transport = FixtureTransport::chunks(["The ", "module ", "handles parsing."]);

    let (fragments, result) = collect(transport, Duration::from_secs(180)).await;

    assert_eq!(fragments, vec!["The ", "module ", "handles parsing."]);
    assert_eq!(fragments.concat(), "The module handles parsing.");
    let summary = result.unwrap_or_else(|err| panic!("stream failed: {err}"));
    assert_eq!(summary.fragments, 3);
    assert_eq!(summary.bytes, "The module handles parsing.".len());
}

#[tokio::test]
async fn single_byte_chunks_split_multibyte_characters_without_loss() {
    let answer = "Ayrıştırıcı modül: çözümleme 🌳 tamam";
    let transport =
        FixtureTransport::chunks(answer.bytes().map(|byte| Bytes::copy_from_slice(&[byte])));

    let (fragments, result) = collect(transport, Duration::from_secs(180)).await;

    assert!(result.is_ok(), "unexpected error: {result:?}");
    assert_eq!(fragments.concat(), answer);
    assert!(fragments.iter().all(|fragment| !fragment.is_empty()));
    assert!(fragments.iter().all(|fragment| !fragment.contains('\u{FFFD}')));
}

#[tokio::test]
async fn rate_limit_surfaces_detail_and_forwards_nothing() {
    let transport = FixtureTransport::new(Script::Status {
        status: StatusCode::TOO_MANY_REQUESTS,
        body: Some(r#"{"detail":"Daily limit reached: 2/day"}"#.to_string()),
    });

    let (fragments, result) = collect(transport, Duration::from_secs(180)).await;

    assert!(fragments.is_empty());
    assert_matches!(
        result,
        Err(ApiError::RateLimited { message, .. }) if message == "Daily limit reached: 2/day"
    );
}

#[tokio::test]
async fn gateway_timeout_is_distinct_from_client_deadline() {
    let transport = FixtureTransport::new(Script::Status {
        status: StatusCode::GATEWAY_TIMEOUT,
        body: None,
    });

    let (fragments, result) = collect(transport, Duration::from_secs(180)).await;

    assert!(fragments.is_empty());
    let err = result.err().unwrap_or_else(|| panic!("expected an error"));
    assert_eq!(
        err,
        ApiError::Timeout {
            origin: TimeoutOrigin::Server
        }
    );
    assert_eq!(err.to_string(), SERVER_TIMEOUT_MESSAGE);
}

#[tokio::test]
async fn other_statuses_use_detail_or_default_message() {
    let transport = FixtureTransport::new(Script::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: None,
    });

    let (_, result) = collect(transport, Duration::from_secs(180)).await;

    assert_eq!(
        result.err(),
        Some(ApiError::ServerTerminal {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: GENERIC_ERROR_MESSAGE.to_string(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_keeps_received_fragments_and_reports_client_timeout() {
    let mut chunks: Vec<Result<Bytes, TransportError>> =
        vec![Ok(Bytes::from("The ")), Ok(Bytes::from("module "))];
    // Half of "ç": must never surface as a garbled fragment.
    chunks.push(Ok(Bytes::copy_from_slice(&"ç".as_bytes()[..1])));
    let transport = FixtureTransport::new(Script::Body {
        chunks,
        stall: true,
    });

    let started = tokio::time::Instant::now();
    let (fragments, result) = collect(transport, Duration::from_secs(5)).await;

    assert_eq!(fragments, vec!["The ", "module "]);
    let err = result.err().unwrap_or_else(|| panic!("expected a timeout"));
    assert!(err.is_client_timeout());
    assert_eq!(err.to_string(), CLIENT_TIMEOUT_MESSAGE);
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6),
        "timed out after {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_before_response_headers_is_a_client_timeout() {
    let transport = FixtureTransport::new(Script::Hang);

    let started = tokio::time::Instant::now();
    let (fragments, result) = collect(transport.clone(), Duration::from_secs(5)).await;

    assert_eq!(fragments, Vec::<String>::new());
    let err = result.err().unwrap_or_else(|| panic!("expected a timeout"));
    assert!(err.is_client_timeout());
    assert_eq!(err.to_string(), CLIENT_TIMEOUT_MESSAGE);
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6),
        "timed out after {elapsed:?}"
    );
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn mid_stream_network_failure_is_transport_aborted() {
    let transport = FixtureTransport::new(Script::Body {
        chunks: vec![
            Ok(Bytes::from("partial ")),
            Err(TransportError::Network("connection reset".to_string())),
            Ok(Bytes::from("never seen")),
        ],
        stall: false,
    });

    let (fragments, result) = collect(transport, Duration::from_secs(180)).await;

    assert_eq!(fragments, vec!["partial "]);
    let err = result.err().unwrap_or_else(|| panic!("expected an error"));
    assert_matches!(&err, ApiError::TransportAborted(message) if message == "connection reset");
    assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn explicit_cancel_stops_fragments_and_is_not_a_timeout() {
    let transport = FixtureTransport::new(Script::Body {
        chunks: vec![Ok(Bytes::from("first "))],
        stall: true,
    });
    let consumer = StreamConsumer::new(transport);
    let controller = CancellationController::with_timeout(Duration::from_secs(180));

    let canceller = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut fragments = Vec::new();
    let result = consumer
        .consume_with(request(), &controller, |text| {
            fragments.push(text.to_string())
        })
        .await;

    assert_eq!(fragments, vec!["first "]);
    assert_matches!(result, Err(ApiError::TransportAborted(_)));
}

#[tokio::test]
async fn ask_client_posts_question_with_bearer_header() {
    let transport = FixtureTransport::chunks(["ok"]);
    let client = AskClient::new(
        transport.clone(),
        Provider::new("http://backend.test/api/v1/"),
        StaticAuth {
            access_token: Some("jwt-token".to_string()),
            user_id: Some("user-1".to_string()),
        },
    );
    let body = AskRequest {
        collection_name: "parser-kit".to_string(),
        question: "What does module X do?".to_string(),
        user_id: "user-1".to_string(),
    };

    let mut answer = String::new();
    let result = client
        .ask_with_deadline(&body, |text| answer.push_str(text))
        .await;

    assert!(result.is_ok(), "unexpected error: {result:?}");
    assert_eq!(answer, "ok");
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://backend.test/api/v1/chat/ask");
    assert_eq!(
        requests[0]
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
        Some("Bearer jwt-token")
    );
    assert_eq!(
        requests[0].body,
        Some(serde_json::json!({
            "collection_name": "parser-kit",
            "question": "What does module X do?",
            "user_id": "user-1",
        }))
    );
}

#[tokio::test]
async fn ask_without_session_fails_before_sending() {
    let transport = FixtureTransport::chunks(["unused"]);
    let client = AskClient::new(
        transport.clone(),
        Provider::new("http://backend.test/api/v1"),
        StaticAuth::default(),
    );
    let body = AskRequest {
        collection_name: "parser-kit".to_string(),
        question: "hi".to_string(),
        user_id: "user-1".to_string(),
    };

    let result = client.ask_with_deadline(&body, |_| {}).await;

    assert_eq!(
        result.err(),
        Some(ApiError::Unknown(MISSING_SESSION_MESSAGE.to_string()))
    );
    assert!(transport.requests().is_empty());
}
