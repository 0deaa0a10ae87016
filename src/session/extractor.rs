//! Session extraction from completed responses.

use cookie::Cookie;
use http::header::SET_COOKIE;
use http::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use crate::http::response::TransportResponse;
use crate::observability::metrics;
use crate::session::token::{CookieProperties, SessionKey, SessionToken};

/// Name of the cookie carrying the backend session.
pub const SESSION_COOKIE_NAME: &str = "zuid";

/// Body field holding the user identifier.
pub const IDENTITY_FIELD: &str = "user";

/// Identity and credential of a freshly authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub identifier: Uuid,
    pub token: SessionToken,
}

/// Turns login responses into [`SessionInfo`].
#[derive(Debug, Clone)]
pub struct SessionExtractor {
    key: SessionKey,
}

impl SessionExtractor {
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Extract from a completed response. Only 2xx responses qualify.
    pub fn extract_from(&self, response: &TransportResponse) -> Option<SessionInfo> {
        if !response.is_success() {
            return None;
        }
        self.extract(&response.headers, &response.body)
    }

    /// Extract from raw headers and body.
    ///
    /// Yields `None` unless both the session cookie and the identity field
    /// are present and usable.
    pub fn extract(&self, headers: &HeaderMap, body: &[u8]) -> Option<SessionInfo> {
        let cookie = find_session_cookie(headers)?;
        let token = match SessionToken::seal(&CookieProperties::from_cookie(&cookie), &self.key) {
            Ok(token) => token,
            Err(e) => {
                tracing::trace!(error = %e, "Failed to seal session cookie");
                return None;
            }
        };
        let identifier = parse_identity(body)?;

        tracing::debug!(user = %identifier, "Session extracted from response");
        metrics::record_session_extracted();

        Some(SessionInfo { identifier, token })
    }
}

/// First `Set-Cookie` entry named [`SESSION_COOKIE_NAME`].
fn find_session_cookie(headers: &HeaderMap) -> Option<Cookie<'static>> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value.to_string()).ok())
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME && !cookie.value().is_empty())
}

fn parse_identity(body: &[u8]) -> Option<Uuid> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    let raw = payload.get(IDENTITY_FIELD)?.as_str()?;
    let identifier = Uuid::try_parse(raw).ok()?;
    // Must survive a round trip through the canonical form.
    (identifier.hyphenated().to_string() == raw.to_ascii_lowercase()).then_some(identifier)
}
