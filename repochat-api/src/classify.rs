//! The single place raw transport signals become [`ApiError`]s.
//!
//! The streamed exchange and every unary backend call route their failures
//! through these functions so users see the same message for the same cause
//! regardless of which path hit it.

use crate::error::ApiError;
use crate::error::GENERIC_ERROR_MESSAGE;
use crate::error::MISSING_SESSION_MESSAGE;
use crate::error::RATE_LIMIT_MESSAGE;
use crate::error::TimeoutOrigin;
use http::HeaderMap;
use http::StatusCode;
use http::header::RETRY_AFTER;
use repochat_async_utils::CancelReason;
use repochat_client::TransportError;
use serde_json::Value;
use std::time::Duration;

/// Classify a transport failure. `deadline_elapsed` wins over whatever the
/// transport reported, since an abort caused by our own deadline is a client
/// timeout no matter how it surfaced.
pub fn classify_transport_error(err: TransportError, deadline_elapsed: bool) -> ApiError {
    if deadline_elapsed {
        return client_timeout();
    }
    match err {
        TransportError::Http {
            status,
            headers,
            body,
            ..
        } => classify_status(status, headers.as_ref(), body.as_deref()),
        TransportError::Timeout => client_timeout(),
        TransportError::Network(message) => ApiError::TransportAborted(message),
        TransportError::Build(message) => ApiError::Unknown(message),
    }
}

/// Classify a non-success HTTP status together with its (optional) body.
pub fn classify_status(status: StatusCode, headers: Option<&HeaderMap>, body: Option<&str>) -> ApiError {
    let detail = body.and_then(error_detail);
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            message: detail.unwrap_or_else(|| RATE_LIMIT_MESSAGE.to_string()),
            retry_after: headers.and_then(retry_after),
        },
        StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout {
            origin: TimeoutOrigin::Server,
        },
        status => ApiError::ServerTerminal {
            status,
            message: detail.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
        },
    }
}

/// Classify an exchange that was cut short by its cancellation controller.
pub fn classify_cancellation(reason: CancelReason) -> ApiError {
    match reason {
        CancelReason::DeadlineElapsed => client_timeout(),
        CancelReason::Requested => ApiError::TransportAborted("request cancelled".to_string()),
    }
}

/// No bearer credential was available to attach to the request.
pub fn missing_credentials() -> ApiError {
    ApiError::Unknown(MISSING_SESSION_MESSAGE.to_string())
}

/// A success response whose body did not have the expected shape.
pub fn malformed_body(err: &serde_json::Error) -> ApiError {
    ApiError::Unknown(format!("failed to decode response: {err}"))
}

fn client_timeout() -> ApiError {
    ApiError::Timeout {
        origin: TimeoutOrigin::Client,
    }
}

/// Extract the human-readable reason from a `{"detail": ...}` envelope.
///
/// `detail` is usually a string; validation failures carry a list of
/// `{"msg": ...}` objects instead.
pub fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let detail = value.get("detail")?;
    let text = match detail {
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
