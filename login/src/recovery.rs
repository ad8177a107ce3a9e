use chrono::DateTime;
use chrono::Utc;
use url::Url;

/// Tokens carried in the fragment of a credential-reset link.
///
/// The identity service redirects to
/// `https://app.example/#access_token=...&refresh_token=...&expires_at=...&type=recovery`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryLink {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub link_type: Option<String>,
}

impl RecoveryLink {
    /// Parse a full link or a bare `#fragment`. Returns `None` unless the
    /// fragment opens a recovery context, i.e. it has `type=recovery` or an
    /// `access_token`.
    pub fn parse(link: &str) -> Option<Self> {
        let link = link.trim();
        let fragment = match link.strip_prefix('#') {
            Some(fragment) => fragment.to_string(),
            None => Url::parse(link).ok()?.fragment()?.to_string(),
        };

        let mut parsed = RecoveryLink::default();
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            let value = value.into_owned();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "access_token" => parsed.access_token = Some(value),
                "refresh_token" => parsed.refresh_token = Some(value),
                "expires_at" => {
                    parsed.expires_at = value
                        .parse::<i64>()
                        .ok()
                        .and_then(|secs| DateTime::from_timestamp(secs, 0));
                }
                "type" => parsed.link_type = Some(value),
                _ => {}
            }
        }

        parsed.opens_recovery_context().then_some(parsed)
    }

    pub fn is_recovery(&self) -> bool {
        self.link_type.as_deref() == Some("recovery")
    }

    fn opens_recovery_context(&self) -> bool {
        self.is_recovery() || self.access_token.is_some()
    }
}
