//! Credential broker
//!
//! Owns the single active credential and its lifecycle: service-account
//! minting, and for interactive OAuth the load / refresh / re-authenticate /
//! persist cycle. Every Google API call obtains its bearer token through
//! [`AuthBroker::access_token`].
//!
//! OAuth lifecycle, as implemented here:
//!
//! - no stored token (or an unreadable one) → consent flow → token persisted
//! - token within the expiry margin and a refresh token on record → refresh,
//!   merge, persist
//! - token expired with no refresh token → terminal; the caller is told to
//!   re-authenticate
//! - explicit re-authentication → delete the stored record (idempotent) and
//!   run the consent flow again

pub mod flow;
pub mod provider;
pub mod service_account;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use self::flow::{run_consent_flow, CONSENT_TIMEOUT_SECS};
use self::provider::google::{workspace_scopes, GoogleProvider};
use self::provider::{OAuthProvider, TokenSet};
use self::service_account::mint_access_token;
use self::store::TokenStore;
use crate::common::{Error, Result};
use crate::config::{AuthConfig, Config, ServiceAccountKey};

/// Refresh when within this many seconds of expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

// ── Credential record ───────────────────────────────────────────────────────

/// The stored credential (decrypted form, also the on-disk JSON shape).
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub access_token: String,

    /// Absent for credentials that never got an offline grant.
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_type")]
    #[zeroize(skip)]
    pub token_type: String,

    /// RFC 3339 expiry of the access token.
    #[zeroize(skip)]
    pub expiry: String,

    #[serde(default)]
    #[zeroize(skip)]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

// Debug output must never leak token material into logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    pub fn from_tokens(tokens: TokenSet) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expiry: tokens.expiry,
            scopes: tokens.scopes,
        }
    }

    /// Merge a refresh response over this record. Providers may omit an
    /// unchanged `refresh_token`; the previous value is kept in that case.
    pub fn merge_refreshed(&mut self, tokens: TokenSet) {
        self.access_token = tokens.access_token;
        if let Some(rt) = tokens.refresh_token {
            self.refresh_token = Some(rt);
        }
        self.token_type = tokens.token_type;
        self.expiry = tokens.expiry;
        if !tokens.scopes.is_empty() {
            self.scopes = tokens.scopes;
        }
    }
}

/// Check whether an RFC 3339 expiry is within `margin_secs` of now.
pub fn is_expiring(expiry: &str, margin_secs: i64) -> bool {
    match chrono::DateTime::parse_from_rfc3339(expiry) {
        Ok(exp) => {
            let remaining = exp.signed_duration_since(chrono::Utc::now()).num_seconds();
            remaining < margin_secs
        }
        Err(_) => true, // unparseable ⇒ treat as expired
    }
}

// ── Broker ──────────────────────────────────────────────────────────────────

enum Mode {
    ServiceAccount(ServiceAccountKey),
    OAuth(GoogleProvider),
}

/// The central credential broker, shared across all tool handlers.
pub struct AuthBroker {
    mode: Mode,
    store: TokenStore,
    oauth_port: u16,
    credential: RwLock<Option<Credential>>,
    /// At most one consent flow per process; the port bind enforces the same
    /// across processes.
    flow_gate: Mutex<()>,
}

impl AuthBroker {
    /// Build the broker and, in OAuth mode, load any persisted token. A
    /// missing or corrupt record defers to the consent flow on first use;
    /// any other store failure is fatal here.
    pub fn new(config: &Config) -> Result<Self> {
        let store = TokenStore::new(config.token_path.clone());

        let mode = match &config.auth {
            AuthConfig::ServiceAccount(key) => Mode::ServiceAccount(key.clone()),
            AuthConfig::OAuth(client) => Mode::OAuth(GoogleProvider::new(client.clone())),
        };

        let credential = match &mode {
            Mode::OAuth(_) => {
                let loaded = store.load()?;
                if loaded.is_some() {
                    info!("loaded persisted OAuth token");
                }
                loaded
            }
            Mode::ServiceAccount(_) => None,
        };

        Ok(Self {
            mode,
            store,
            oauth_port: config.oauth_port,
            credential: RwLock::new(credential),
            flow_gate: Mutex::new(()),
        })
    }

    /// A bearer token valid for at least the expiry margin, minting,
    /// refreshing or authenticating as needed.
    pub async fn access_token(&self) -> Result<String> {
        match &self.mode {
            Mode::ServiceAccount(key) => self.service_account_token(key).await,
            Mode::OAuth(provider) => self.oauth_token(provider).await,
        }
    }

    /// Explicit refresh, exposed as a tool. Requires a refresh token in
    /// OAuth mode; service-account mode simply re-mints.
    pub async fn refresh(&self) -> Result<String> {
        match &self.mode {
            Mode::ServiceAccount(key) => {
                let tokens = mint_access_token(key, &workspace_scopes()).await?;
                let expiry = tokens.expiry.clone();
                *self.credential.write().await = Some(Credential::from_tokens(tokens));
                Ok(format!(
                    "Service-account access token re-minted, valid until {expiry}."
                ))
            }
            Mode::OAuth(provider) => {
                let mut guard = self.credential.write().await;
                let record = match guard.as_mut() {
                    Some(record) => record,
                    None => return Err(Error::TokenNotFound),
                };

                // Precondition check happens before any network or store
                // mutation: a record without a refresh token stays untouched.
                let refresh_token = record
                    .refresh_token
                    .clone()
                    .ok_or(Error::MissingRefreshToken)?;

                let tokens = provider.refresh_token(&refresh_token).await?;
                record.merge_refreshed(tokens);
                self.store.save(record)?;

                Ok(format!(
                    "Tokens refreshed successfully, valid until {}.",
                    record.expiry
                ))
            }
        }
    }

    /// Drop the stored credential (idempotent) and run the consent flow
    /// again.
    pub async fn reauthenticate(&self) -> Result<String> {
        let provider = match &self.mode {
            Mode::ServiceAccount(_) => {
                return Err(Error::Config(
                    "re-authentication applies to interactive OAuth credentials; \
                     service-account tokens are derived from the key"
                        .to_string(),
                ))
            }
            Mode::OAuth(provider) => provider,
        };

        self.store.delete()?;
        *self.credential.write().await = None;
        info!("stored token dropped, re-entering consent flow");

        let credential = self.authenticate(provider).await?;
        let expiry = credential.expiry.clone();
        *self.credential.write().await = Some(credential);

        Ok(format!(
            "Re-authentication complete, new token valid until {expiry}."
        ))
    }

    // ── Internal ────────────────────────────────────────────────────────────

    async fn service_account_token(&self, key: &ServiceAccountKey) -> Result<String> {
        {
            let guard = self.credential.read().await;
            if let Some(record) = guard.as_ref() {
                if !is_expiring(&record.expiry, EXPIRY_MARGIN_SECS) {
                    return Ok(record.access_token.clone());
                }
            }
        }

        let tokens = mint_access_token(key, &workspace_scopes()).await?;
        let credential = Credential::from_tokens(tokens);
        let token = credential.access_token.clone();
        *self.credential.write().await = Some(credential);
        Ok(token)
    }

    async fn oauth_token(&self, provider: &GoogleProvider) -> Result<String> {
        // NoToken → Authenticating. The flow's gate is the serialization
        // point, so the credential lock is not held across it.
        if self.credential.read().await.is_none() {
            let credential = self.authenticate(provider).await?;
            let token = credential.access_token.clone();
            *self.credential.write().await = Some(credential);
            return Ok(token);
        }

        let mut guard = self.credential.write().await;
        let Some(record) = guard.as_mut() else {
            // Raced with a re-authentication that dropped the record.
            return Err(Error::TokenNotFound);
        };

        if !is_expiring(&record.expiry, EXPIRY_MARGIN_SECS) {
            return Ok(record.access_token.clone());
        }

        match record.refresh_token.clone() {
            Some(refresh_token) => match provider.refresh_token(&refresh_token).await {
                Ok(tokens) => {
                    record.merge_refreshed(tokens);
                    self.store.save(record)?;
                    Ok(record.access_token.clone())
                }
                Err(e) => {
                    // Within the margin but not actually expired: keep
                    // serving the old token through a transient failure.
                    if !is_expiring(&record.expiry, 0) {
                        warn!(error = %e, "token refresh failed but token not yet expired");
                        Ok(record.access_token.clone())
                    } else {
                        Err(e)
                    }
                }
            },
            None => {
                if is_expiring(&record.expiry, 0) {
                    Err(Error::MissingRefreshToken)
                } else {
                    Ok(record.access_token.clone())
                }
            }
        }
    }

    async fn authenticate(&self, provider: &GoogleProvider) -> Result<Credential> {
        let _gate = self
            .flow_gate
            .try_lock()
            .map_err(|_| Error::ConsentFlowInProgress)?;

        let credential = run_consent_flow(provider, self.oauth_port, CONSENT_TIMEOUT_SECS).await?;
        self.store.save(&credential)?;
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClient;
    use std::path::PathBuf;

    fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: refresh.map(String::from),
            token_type: "Bearer".to_string(),
            expiry: "2026-08-05T13:00:00+00:00".to_string(),
            scopes: vec![],
        }
    }

    fn oauth_config(token_path: PathBuf) -> Config {
        Config {
            auth: AuthConfig::OAuth(OAuthClient {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
            }),
            oauth_port: 3000,
            token_path,
        }
    }

    #[test]
    fn test_is_expiring_past_timestamp() {
        assert!(is_expiring("2020-01-01T00:00:00+00:00", 0));
    }

    #[test]
    fn test_is_expiring_future_timestamp() {
        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        assert!(!is_expiring(&future, 60));
    }

    #[test]
    fn test_is_expiring_within_margin() {
        let soon = (chrono::Utc::now() + chrono::Duration::seconds(30)).to_rfc3339();
        assert!(is_expiring(&soon, 60));
    }

    #[test]
    fn test_is_expiring_unparseable() {
        assert!(is_expiring("not a timestamp", 0));
    }

    #[test]
    fn test_merge_preserves_refresh_token_when_omitted() {
        let mut record = Credential::from_tokens(tokens("a1", Some("r1")));

        record.merge_refreshed(tokens("a2", None));
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));

        // Refreshing twice in a row, both responses omitting the refresh
        // token, still leaves a usable one.
        record.merge_refreshed(tokens("a3", None));
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));
        assert_eq!(record.access_token, "a3");
    }

    #[test]
    fn test_merge_replaces_refresh_token_when_present() {
        let mut record = Credential::from_tokens(tokens("a1", Some("r1")));
        record.merge_refreshed(tokens("a2", Some("r2")));
        assert_eq!(record.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let record = Credential::from_tokens(tokens("super-secret-access", Some("super-secret-refresh")));
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("super-secret-access"));
        assert!(!rendered.contains("super-secret-refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_deserializes_with_missing_optionals() {
        let json = r#"{"access_token": "a", "expiry": "2026-08-05T13:00:00+00:00"}"#;
        let record: Credential = serde_json::from_str(json).unwrap();
        assert!(record.refresh_token.is_none());
        assert_eq!(record.token_type, "Bearer");
        assert!(record.scopes.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_stored_token_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let broker = AuthBroker::new(&oauth_config(dir.path().join("token.json"))).unwrap();

        assert!(matches!(broker.refresh().await, Err(Error::TokenNotFound)));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");

        let record = Credential {
            access_token: "a1".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: "2020-01-01T00:00:00+00:00".to_string(),
            scopes: vec![],
        };
        TokenStore::new(token_path.clone()).save(&record).unwrap();

        let broker = AuthBroker::new(&oauth_config(token_path.clone())).unwrap();
        assert!(matches!(
            broker.refresh().await,
            Err(Error::MissingRefreshToken)
        ));

        // The persisted record must not have been mutated by the failure.
        let reloaded = TokenStore::new(token_path).load().unwrap().unwrap();
        assert_eq!(reloaded.access_token, "a1");
        assert!(reloaded.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");

        let record = Credential {
            access_token: "a1".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: "2020-01-01T00:00:00+00:00".to_string(),
            scopes: vec![],
        };
        TokenStore::new(token_path.clone()).save(&record).unwrap();

        let broker = AuthBroker::new(&oauth_config(token_path)).unwrap();
        assert!(matches!(
            broker.access_token().await,
            Err(Error::MissingRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_unexpired_token_served_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");

        let record = Credential {
            access_token: "still-good".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
            scopes: vec![],
        };
        TokenStore::new(token_path.clone()).save(&record).unwrap();

        let broker = AuthBroker::new(&oauth_config(token_path)).unwrap();
        assert_eq!(broker.access_token().await.unwrap(), "still-good");
    }
}
