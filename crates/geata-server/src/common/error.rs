//! Unified Error Types
//!
//! One tagged error per failure domain: argument validation, Google API
//! calls, the token store, and the OAuth flow. Handlers map these onto
//! JSON-RPC error responses or tool-level error text.

use std::io;

/// Server-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed tool arguments, rejected before any provider call.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Tool name not in the dispatch table.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Missing or contradictory runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure (DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Structured error returned by a Google API.
    #[error("Google API error {status}: {message}")]
    Api { status: u16, message: String },

    /// 429 from a Google API.
    #[error("rate limited by Google API, try again later")]
    RateLimited,

    /// Event listing failed for one calendar; aborts the whole free-time
    /// computation (no partial results).
    #[error("failed to fetch events for calendar {calendar_id}: {source}")]
    CalendarFetch {
        calendar_id: String,
        #[source]
        source: Box<Error>,
    },

    /// No credential on record; the consent flow has to run first.
    #[error("no stored token; authenticate first")]
    TokenNotFound,

    /// Token store I/O failure other than not-found.
    #[error("token store error: {0}")]
    TokenStore(#[source] io::Error),

    /// Refresh precondition: the stored record carries no refresh token.
    #[error("no refresh token on record; re-authenticate to obtain a new grant")]
    MissingRefreshToken,

    /// The consent flow received no callback within the deadline.
    #[error("OAuth consent flow timed out after {0} seconds")]
    ConsentTimeout(u64),

    /// The fixed callback port is held by someone else (most likely another
    /// consent flow).
    #[error("OAuth callback port {0} is already in use")]
    CallbackPortInUse(u16),

    /// A consent flow is already waiting on a callback in this process.
    #[error("an OAuth consent flow is already in progress")]
    ConsentFlowInProgress,

    /// The callback request carried no authorization code.
    #[error("OAuth callback carried no authorization code")]
    MissingAuthCode,

    /// CSRF state echoed by the callback did not match the one we issued.
    #[error("OAuth state parameter mismatch")]
    StateMismatch,

    /// Error response from the OAuth endpoints (exchange, refresh).
    #[error("OAuth provider error: {0}")]
    OAuth(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// RS256 signing of the service-account assertion failed.
    #[error("failed to sign service-account assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_fetch_carries_calendar_id() {
        let err = Error::CalendarFetch {
            calendar_id: "team@example.com".to_string(),
            source: Box::new(Error::RateLimited),
        };
        let msg = err.to_string();
        assert!(msg.contains("team@example.com"));
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(err.to_string(), "Google API error 404: Not Found");
    }
}
