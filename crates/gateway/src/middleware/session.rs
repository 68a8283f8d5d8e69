//! Cookie-based session identification
//!
//! Every API request carries a session id. Clients without a valid
//! `session_id` cookie get a fresh id, and the response sets the cookie.

use axum::{
    extract::{FromRequestParts, Request},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use synthesis_common::{
    errors::{AppError, Result},
    models::Session,
};

pub const SESSION_COOKIE: &str = "session_id";

const MAX_SESSION_ID_LEN: usize = 128;

/// Session id of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Read a cookie by name from the `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// Attach a `SessionId` to the request, issuing a cookie for new clients
pub async fn session_cookie(mut request: Request, next: Next) -> Response {
    let (id, is_new) = match cookie_value(request.headers(), SESSION_COOKIE).filter(|id| is_valid_id(id)) {
        Some(id) => (id, false),
        None => (Session::new_id(), true),
    };

    request.extensions_mut().insert(SessionId(id.clone()));
    let mut response = next.run(request).await;

    if is_new {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
                tracing::debug!(session_id = %id, "Issued session cookie");
            }
            Err(e) => tracing::warn!(error = %e, "Could not encode session cookie"),
        }
    }

    response
}

/// Axum extractor for SessionId
impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        if let Some(id) = parts.extensions.get::<SessionId>() {
            return Ok(id.clone());
        }

        cookie_value(&parts.headers, SESSION_COOKIE)
            .filter(|id| is_valid_id(id))
            .map(SessionId)
            .ok_or(AppError::MissingSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session_id=abc-123 ; other=1"));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("abc-123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_across_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("session_id=xyz"));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_id("0b6f1c1e-1d2a-4e8f-9f00-2c8c0a1e9d11"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../../etc"));
        assert!(!is_valid_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)));
    }
}
