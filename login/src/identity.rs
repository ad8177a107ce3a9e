use crate::recovery::RecoveryLink;
use crate::session::Session;
use crate::session::User;
use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use http::header::AUTHORIZATION;
use http::header::HeaderName;
use repochat_api::classify::classify_status;
use repochat_client::HttpTransport;
use repochat_client::Request;
use repochat_client::TransportError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

pub const MIN_PASSWORD_LEN: usize = 6;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("identity service unreachable: {0}")]
    Transport(String),
    #[error("unexpected identity response: {0}")]
    Decode(String),
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },
    #[error("recovery link carries no access token")]
    MissingToken,
}

impl From<TransportError> for IdentityError {
    fn from(err: TransportError) -> Self {
        match err {
            // Throttling and gateway timeouts read the same as on the backend.
            TransportError::Http {
                status: status @ (StatusCode::TOO_MANY_REQUESTS | StatusCode::GATEWAY_TIMEOUT),
                headers,
                body,
                ..
            } => IdentityError::Rejected {
                status,
                message: classify_status(status, headers.as_ref(), body.as_deref())
                    .user_message(),
            },
            TransportError::Http { status, body, .. } => IdentityError::Rejected {
                status,
                message: body
                    .as_deref()
                    .and_then(rejection_message)
                    .unwrap_or_else(|| format!("identity service returned {status}")),
            },
            other => IdentityError::Transport(other.to_string()),
        }
    }
}

/// Pull a readable reason out of an identity error body. Different
/// endpoints use `msg`, `error_description` or `message`.
fn rejection_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "error_description", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

impl From<TokenResponse> for Session {
    fn from(resp: TokenResponse) -> Self {
        let expires_at = resp
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                // Out-of-range lifetimes are treated as unknown.
                resp.expires_in
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            });
        Session {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at,
            user: resp.user,
        }
    }
}

/// Client for the hosted identity service's REST API.
pub struct IdentityClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    anon_key: String,
}

impl<T: HttpTransport> IdentityClient<T> {
    pub fn new(transport: T, base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            anon_key: anon_key.into(),
        }
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let req = self
            .request(Method::POST, "token?grant_type=password", None)?
            .with_json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = self.send(req).await?;
        Ok(token.into())
    }

    pub async fn get_user(&self, access_token: &str) -> Result<User, IdentityError> {
        let req = self.request(Method::GET, "user", Some(access_token))?;
        self.send(req).await
    }

    /// Turn the tokens of a recovery link into a session by asking the
    /// identity service who they belong to.
    pub async fn exchange_recovery(&self, link: &RecoveryLink) -> Result<Session, IdentityError> {
        let access_token = link
            .access_token
            .as_deref()
            .ok_or(IdentityError::MissingToken)?;
        let user = self.get_user(access_token).await?;
        debug!(user_id = %user.id, "recovery token exchanged");
        Ok(Session {
            access_token: access_token.to_string(),
            refresh_token: link.refresh_token.clone(),
            expires_at: link.expires_at,
            user,
        })
    }

    pub async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<User, IdentityError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }
        let req = self
            .request(Method::PUT, "user", Some(access_token))?
            .with_json(&json!({ "password": new_password }));
        self.send(req).await
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let req = self.request(Method::POST, "logout", Some(access_token))?;
        self.transport.execute(req).await?;
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
    ) -> Result<Request, IdentityError> {
        let url = format!("{}/auth/v1/{path}", self.base_url.trim_end_matches('/'));
        let apikey = header_value(&self.anon_key)?;
        let mut req = Request::new(method, url)
            .with_timeout(REQUEST_TIMEOUT)
            .with_header(HeaderName::from_static("apikey"), apikey);
        if let Some(token) = access_token {
            req = req.with_header(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        Ok(req)
    }

    async fn send<R: DeserializeOwned>(&self, req: Request) -> Result<R, IdentityError> {
        let url = req.url.clone();
        let resp = self.transport.execute(req).await.map_err(|err| {
            let err = IdentityError::from(err);
            warn!(%url, "identity request failed: {err}");
            err
        })?;
        serde_json::from_slice(&resp.body).map_err(|err| IdentityError::Decode(err.to_string()))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, IdentityError> {
    HeaderValue::from_str(value).map_err(|err| IdentityError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token(body: &str) -> Session {
        match serde_json::from_str::<TokenResponse>(body) {
            Ok(token) => token.into(),
            Err(err) => panic!("bad token fixture: {err}"),
        }
    }

    #[test]
    fn absurd_token_lifetime_is_treated_as_unknown() {
        let session = token(
            r#"{"access_token":"t","expires_in":9223372036854775807,"user":{"id":"u"}}"#,
        );
        assert_eq!(session.access_token, "t");
        assert_eq!(session.expires_at, None);

        let session =
            token(r#"{"access_token":"t","expires_in":-9223372036854775808,"user":{"id":"u"}}"#);
        assert_eq!(session.expires_at, None);
    }

    #[test]
    fn token_lifetime_becomes_an_expiry() {
        let before = Utc::now();
        let session = token(r#"{"access_token":"t","expires_in":3600,"user":{"id":"u"}}"#);
        let expires_at = session
            .expires_at
            .unwrap_or_else(|| panic!("expiry missing"));
        assert!(expires_at >= before + TimeDelta::seconds(3600));
        assert!(expires_at <= Utc::now() + TimeDelta::seconds(3600));
    }

    #[test]
    fn throttling_uses_the_shared_messages() {
        let rate_limited = IdentityError::from(TransportError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            url: None,
            headers: None,
            body: Some(r#"{"msg":"slow down"}"#.to_string()),
        });
        assert_eq!(
            rate_limited.to_string(),
            repochat_api::error::RATE_LIMIT_MESSAGE
        );

        let gateway = IdentityError::from(TransportError::Http {
            status: StatusCode::GATEWAY_TIMEOUT,
            url: None,
            headers: None,
            body: None,
        });
        assert_eq!(
            gateway.to_string(),
            repochat_api::error::SERVER_TIMEOUT_MESSAGE
        );
    }
}
