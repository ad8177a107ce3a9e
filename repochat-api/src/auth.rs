use crate::classify::missing_credentials;
use crate::error::ApiError;
use http::HeaderMap;
use http::HeaderValue;
use repochat_client::Request;

/// Supplies the bearer credential and user identity for backend requests.
///
/// Implementations must be cheap and non-blocking. Whatever produces the
/// session (sign-in, recovery, refresh) runs before requests reach here.
pub trait AuthProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
    fn user_id(&self) -> Option<String> {
        None
    }
}

/// Fixed credentials, e.g. read from config or the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl AuthProvider for StaticAuth {
    fn bearer_token(&self) -> Option<String> {
        self.access_token.clone()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

impl<A: AuthProvider + ?Sized> AuthProvider for std::sync::Arc<A> {
    fn bearer_token(&self) -> Option<String> {
        (**self).bearer_token()
    }

    fn user_id(&self) -> Option<String> {
        (**self).user_id()
    }
}

/// Build the `Authorization` header, failing when there is no usable token.
pub(crate) fn bearer_header<A: AuthProvider + ?Sized>(auth: &A) -> Result<HeaderValue, ApiError> {
    let token = auth
        .bearer_token()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(missing_credentials)?;
    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| missing_credentials())
}

pub(crate) fn add_bearer(headers: &mut HeaderMap, value: &HeaderValue) {
    let _ = headers.insert(http::header::AUTHORIZATION, value.clone());
}

/// Attach the bearer credential to `req`, or fail with the missing-session
/// error before anything goes on the wire.
pub fn require_auth_headers<A: AuthProvider + ?Sized>(
    auth: &A,
    mut req: Request,
) -> Result<Request, ApiError> {
    let header = bearer_header(auth)?;
    add_bearer(&mut req.headers, &header);
    Ok(req)
}
