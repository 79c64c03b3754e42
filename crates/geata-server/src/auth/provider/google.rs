//! Google OAuth2 Provider
//!
//! PKCE Authorization Code flow against the Google OAuth2 endpoints. The
//! client id/secret come from configuration; they must be registered in
//! Google Cloud Console as a "Desktop app" OAuth client.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{error, info};

use super::{OAuthProvider, TokenSet};
use crate::common::{Error, Result};
use crate::config::OAuthClient;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Workspace scopes the server requests, in both credential modes.
const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/tasks",
];

/// The scope set shared by the consent flow and the service-account grant.
pub fn workspace_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// Google OAuth2 provider.
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
}

impl GoogleProvider {
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client_id: client.client_id,
            client_secret: client.client_secret,
        }
    }
}

impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorize_url(
        &self,
        scopes: &[String],
        state: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> String {
        let scope_str = scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
            AUTH_ENDPOINT,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        info!("exchanging authorization code for tokens");

        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("code", code);
        params.insert("code_verifier", code_verifier);
        params.insert("grant_type", "authorization_code");
        params.insert("redirect_uri", redirect_uri);

        let response = post_form(TOKEN_ENDPOINT, &params).await?;
        parse_token_response(&response)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        info!("refreshing access token");

        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("refresh_token", refresh_token);
        params.insert("grant_type", "refresh_token");

        let response = post_form(TOKEN_ENDPOINT, &params).await?;
        parse_token_response(&response)
    }

    fn default_scopes(&self) -> Vec<String> {
        workspace_scopes()
    }
}

// ── HTTP utilities ──────────────────────────────────────────────────────────

/// POST a form-encoded request and return the response body. Secrets travel
/// in the request body, never in process arguments.
async fn post_form(url: &str, params: &HashMap<&str, &str>) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client.post(url).form(params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error response".to_string());
        error!(%status, body = %body, "token endpoint returned an error");
        return Err(Error::OAuth(format!("HTTP {status}: {body}")));
    }

    Ok(response.text().await?)
}

/// Parse a Google OAuth2 token response.
fn parse_token_response(body: &str) -> Result<TokenSet> {
    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::OAuth(format!("invalid JSON token response: {e}")))?;

    if let Some(err) = parsed.get("error").and_then(|v| v.as_str()) {
        let desc = parsed
            .get("error_description")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        return Err(Error::OAuth(format!("{err}: {desc}")));
    }

    let access_token = parsed
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::OAuth("missing access_token in response".to_string()))?
        .to_string();

    let refresh_token = parsed
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .map(String::from);

    let token_type = parsed
        .get("token_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Bearer")
        .to_string();

    let expires_in = parsed
        .get("expires_in")
        .and_then(|v| v.as_u64())
        .unwrap_or(3600);

    let expiry = (chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64)).to_rfc3339();

    let scopes = parsed
        .get("scope")
        .and_then(|v| v.as_str())
        .map(|s| s.split(' ').map(String::from).collect())
        .unwrap_or_default();

    Ok(TokenSet {
        access_token,
        refresh_token,
        token_type,
        expiry,
        scopes,
    })
}

// ── PKCE Utilities ──────────────────────────────────────────────────────────

/// Generate a PKCE code verifier (43-128 characters of unreserved URI characters).
pub fn generate_code_verifier() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}

/// Derive the PKCE code challenge from a code verifier using S256.
pub fn generate_code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(verifier.as_bytes());
    base64_url_encode(&hash)
}

/// Random state string for CSRF protection.
pub fn generate_state() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rngs::OsRng.gen();
    hex::encode(bytes)
}

/// Base64url encoding (no padding) per RFC 4648 §5.
fn base64_url_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> GoogleProvider {
        GoogleProvider::new(OAuthClient {
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
        })
    }

    #[test]
    fn test_code_verifier_length() {
        let v = generate_code_verifier();
        assert!(v.len() >= 43);
        assert!(v.len() <= 128);
    }

    #[test]
    fn test_code_challenge_deterministic() {
        let verifier = "test_verifier_string_for_determinism";
        let c1 = generate_code_challenge(verifier);
        let c2 = generate_code_challenge(verifier);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_state_is_unique() {
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn test_authorize_url_contains_pkce_fields() {
        let provider = test_provider();
        let url = provider.authorize_url(
            &provider.default_scopes(),
            "st4te",
            "ch4llenge",
            "http://127.0.0.1:3000",
        );
        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("code_challenge=ch4llenge"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_parse_token_response_success() {
        let body = r#"{
            "access_token": "ya29.test",
            "refresh_token": "1//0e.test",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "https://www.googleapis.com/auth/gmail.modify"
        }"#;

        let tokens = parse_token_response(body).unwrap();
        assert_eq!(tokens.access_token, "ya29.test");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//0e.test"));
        assert_eq!(tokens.scopes.len(), 1);
    }

    #[test]
    fn test_parse_token_response_without_refresh_token() {
        let body = r#"{"access_token": "ya29.test", "expires_in": 3600}"#;
        let tokens = parse_token_response(body).unwrap();
        assert!(tokens.refresh_token.is_none());
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[test]
    fn test_parse_token_response_error() {
        let body = r#"{"error": "invalid_grant", "error_description": "Token has been revoked"}"#;
        let err = parse_token_response(body).unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }
}
