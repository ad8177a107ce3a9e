use crate::auth::AuthProvider;
use crate::auth::require_auth_headers;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::stream_consumer::StreamConsumer;
use crate::stream_consumer::StreamSummary;
use http::HeaderValue;
use http::Method;
use repochat_async_utils::CancellationController;
use repochat_client::HttpTransport;
use repochat_client::Request;
use serde::Serialize;

/// Body of `POST chat/ask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    /// Name of the indexed repository the question is about.
    pub collection_name: String,
    pub question: String,
    pub user_id: String,
}

/// Sends questions and streams the answers back.
pub struct AskClient<T: HttpTransport, A: AuthProvider> {
    consumer: StreamConsumer<T>,
    provider: Provider,
    auth: A,
}

impl<T: HttpTransport, A: AuthProvider> AskClient<T, A> {
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            consumer: StreamConsumer::new(transport),
            provider,
            auth,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Ask under the provider's default deadline.
    pub async fn ask_with_deadline<F>(
        &self,
        body: &AskRequest,
        on_fragment: F,
    ) -> Result<StreamSummary, ApiError>
    where
        F: FnMut(&str),
    {
        let controller = CancellationController::with_timeout(self.provider.request_timeout);
        self.ask(body, &controller, on_fragment).await
    }

    pub async fn ask<F>(
        &self,
        body: &AskRequest,
        controller: &CancellationController,
        on_fragment: F,
    ) -> Result<StreamSummary, ApiError>
    where
        F: FnMut(&str),
    {
        let request = self.build(body)?;
        self.consumer
            .consume_with(request, controller, on_fragment)
            .await
    }

    fn build(&self, body: &AskRequest) -> Result<Request, ApiError> {
        let request = self
            .provider
            .build_request(Method::POST, self.provider.url_for_path("chat/ask"))
            .with_json(body)
            .with_header(
                http::header::ACCEPT,
                HeaderValue::from_static("text/event-stream, text/plain"),
            );
        require_auth_headers(&self.auth, request)
    }
}
