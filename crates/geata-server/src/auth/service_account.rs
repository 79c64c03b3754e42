//! Service-account credentials
//!
//! Mints short-lived access tokens from a long-lived private key via the
//! RFC 7523 JWT-bearer grant. Nothing is persisted: the key re-signs a fresh
//! assertion whenever the cached token approaches expiry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::info;

use super::provider::TokenSet;
use crate::common::{Error, Result};
use crate::config::ServiceAccountKey;

/// Assertion lifetime requested from the token endpoint.
const TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

/// Sign a JWT assertion and exchange it for an access token.
pub async fn mint_access_token(key: &ServiceAccountKey, scopes: &[String]) -> Result<TokenSet> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs();
    let exp = now + TOKEN_LIFETIME_SECS;

    let claims = Claims {
        iss: key.client_email.clone(),
        scope: scopes.join(" "),
        aud: key.token_uri.clone(),
        iat: now,
        exp,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client
        .post(&key.token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(Error::OAuth(format!(
            "service-account token exchange failed (HTTP {status}): {body}"
        )));
    }

    let parsed: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| Error::OAuth(format!("invalid token response JSON: {e}")))?;

    let access_token = parsed
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::OAuth("token response missing access_token".to_string()))?
        .to_string();

    let expiry = (chrono::Utc::now() + chrono::Duration::seconds(TOKEN_LIFETIME_SECS as i64))
        .to_rfc3339();

    info!(client_email = %key.client_email, "service-account access token minted");

    Ok(TokenSet {
        access_token,
        refresh_token: None,
        token_type: "Bearer".to_string(),
        expiry,
        scopes: scopes.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_serialize_with_space_joined_scope() {
        let claims = Claims {
            iss: "svc@project.iam.gserviceaccount.com".to_string(),
            scope: "a b".to_string(),
            aud: "https://oauth2.googleapis.com/token".to_string(),
            iat: 1,
            exp: 3601,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["scope"], "a b");
        assert_eq!(json["iss"], "svc@project.iam.gserviceaccount.com");
    }

    #[tokio::test]
    async fn test_mint_rejects_malformed_key() {
        let key = ServiceAccountKey {
            client_email: "svc@project.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem key".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        };
        let err = mint_access_token(&key, &["scope".to_string()]).await;
        assert!(matches!(err, Err(Error::Jwt(_))));
    }
}
