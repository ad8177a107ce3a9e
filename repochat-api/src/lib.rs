pub mod auth;
pub mod classify;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod provider;
pub mod stream_consumer;
pub mod types;

pub use crate::auth::AuthProvider;
pub use crate::auth::StaticAuth;
pub use crate::auth::require_auth_headers;
pub use crate::decode::StreamDecoder;
pub use crate::endpoint::ask::AskClient;
pub use crate::endpoint::ask::AskRequest;
pub use crate::endpoint::backend::BackendClient;
pub use crate::error::ApiError;
pub use crate::error::ErrorDisposition;
pub use crate::error::TimeoutOrigin;
pub use crate::provider::Provider;
pub use crate::provider::RetryConfig;
pub use crate::stream_consumer::StreamConsumer;
pub use crate::stream_consumer::StreamSummary;
pub use crate::types::DeleteRepoResponse;
pub use crate::types::MessageRole;
pub use crate::types::RepoIndexResponse;
pub use crate::types::SaveOutcome;
pub use crate::types::StoredMessage;
pub use crate::types::UserRepo;

pub use repochat_async_utils::CancelReason;
pub use repochat_async_utils::CancellationController;
pub use repochat_client::HttpTransport;
pub use repochat_client::ReqwestTransport;
