//! OAuth Provider Abstraction
//!
//! Trait-based provider seam: authorization URL construction, code exchange
//! and token refresh are the provider-specific network calls; everything
//! above them (listener, store, lifecycle) is provider-agnostic.

pub mod google;

use serde::{Deserialize, Serialize};

use crate::common::Result;

/// Tokens returned from an OAuth token exchange or refresh.
///
/// `refresh_token` is optional: providers omit it on refresh when the
/// previous one is still valid, and the caller must keep the old value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expiry: String,
    pub scopes: Vec<String>,
}

/// OAuth provider trait.
#[allow(async_fn_in_trait)]
pub trait OAuthProvider {
    /// Provider name (e.g. "google")
    fn name(&self) -> &str;

    /// Build the authorization URL for the PKCE flow.
    fn authorize_url(
        &self,
        scopes: &[String],
        state: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet>;

    /// Refresh an access token using a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet>;

    /// Default scopes for this provider.
    fn default_scopes(&self) -> Vec<String>;
}
