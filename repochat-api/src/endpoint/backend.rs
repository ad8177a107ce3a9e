use crate::auth::AuthProvider;
use crate::auth::add_bearer;
use crate::auth::bearer_header;
use crate::classify::classify_transport_error;
use crate::classify::malformed_body;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::types::DeleteRepoResponse;
use crate::types::IndexRepoBody;
use crate::types::MessageRole;
use crate::types::RepoIndexResponse;
use crate::types::RepoRefBody;
use crate::types::SaveMessageBody;
use crate::types::SaveOutcome;
use crate::types::SaveResponse;
use crate::types::StoredMessage;
use crate::types::UserRepo;
use http::Method;
use repochat_client::HttpTransport;
use repochat_client::RetryPolicy;
use repochat_client::run_with_retry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

/// Request/response calls against the backend: repository management and
/// chat persistence.
///
/// Every failure goes through the same classification as the streamed
/// exchange. Reads and deletes retry per the provider's [`RetryConfig`];
/// indexing and saving a message are sent once so a retried 5xx cannot
/// index twice or duplicate a turn.
///
/// [`RetryConfig`]: crate::provider::RetryConfig
pub struct BackendClient<T: HttpTransport, A: AuthProvider> {
    transport: T,
    provider: Provider,
    auth: A,
}

impl<T: HttpTransport, A: AuthProvider> BackendClient<T, A> {
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            transport,
            provider,
            auth,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub async fn index_repo(
        &self,
        repo_url: &str,
        user_id: &str,
    ) -> Result<RepoIndexResponse, ApiError> {
        let body = IndexRepoBody { repo_url, user_id };
        self.send(
            Method::POST,
            self.provider.url_for_path("repo/index"),
            Some(to_value(&body)?),
            RetryPolicy::no_retry(),
        )
        .await
    }

    /// Repositories of `user_id`, newest first.
    pub async fn list_repos(&self, user_id: &str) -> Result<Vec<UserRepo>, ApiError> {
        self.send(
            Method::GET,
            self.provider
                .url_with_query("repo/list", &[("user_id", user_id)]),
            None,
            self.provider.retry.to_policy(),
        )
        .await
    }

    /// Delete a repository together with its vectors and chat history.
    pub async fn delete_repo(
        &self,
        user_id: &str,
        repo_name: &str,
    ) -> Result<DeleteRepoResponse, ApiError> {
        let body = RepoRefBody { user_id, repo_name };
        self.send(
            Method::POST,
            self.provider.url_for_path("repo/delete"),
            Some(to_value(&body)?),
            self.provider.retry.to_policy(),
        )
        .await
    }

    pub async fn save_message(
        &self,
        user_id: &str,
        repo_name: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<SaveOutcome, ApiError> {
        let body = SaveMessageBody {
            user_id,
            repo_name,
            role,
            content,
        };
        let response: SaveResponse = self
            .send(
                Method::POST,
                self.provider.url_for_path("chat/save"),
                Some(to_value(&body)?),
                RetryPolicy::no_retry(),
            )
            .await?;
        let outcome = SaveOutcome::from(response);
        if let SaveOutcome::Rejected(detail) = &outcome {
            warn!(repo_name, "backend refused to store message: {detail}");
        }
        Ok(outcome)
    }

    /// Stored turns for one repository, oldest first.
    pub async fn chat_history(
        &self,
        user_id: &str,
        repo_name: &str,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        self.send(
            Method::GET,
            self.provider.url_with_query(
                "chat/history",
                &[("user_id", user_id), ("repo_name", repo_name)],
            ),
            None,
            self.provider.retry.to_policy(),
        )
        .await
    }

    async fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
        policy: RetryPolicy,
    ) -> Result<R, ApiError> {
        let authorization = bearer_header(&self.auth)?;
        let make_request = || {
            let mut req = self
                .provider
                .build_request(method.clone(), url.clone())
                .with_timeout(self.provider.request_timeout);
            req.body = body.clone();
            add_bearer(&mut req.headers, &authorization);
            req
        };

        let response = run_with_retry(policy, make_request, |req, attempt| {
            debug!(attempt, method = %req.method, url = %req.url, "backend request");
            self.transport.execute(req)
        })
        .await
        .map_err(|err| {
            let err = classify_transport_error(err, false);
            warn!(%method, %url, "backend request failed: {err}");
            err
        })?;

        serde_json::from_slice(&response.body).map_err(|err| malformed_body(&err))
    }
}

fn to_value<S: Serialize>(body: &S) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|err| malformed_body(&err))
}
