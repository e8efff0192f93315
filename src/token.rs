//! Credential lifecycle: load, validate, refresh, persist, notify.
//!
//! Owns the single access/refresh token pair for the process. Validation
//! runs on a timer and refreshes proactively before expiry; any outbound
//! Helix call made through [`TokenManager`] gets exactly one
//! refresh-and-retry on a 401. Lifecycle events go out over a broadcast
//! channel in emission order and are consumed by one listener loop in core.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::TokenConfig;

/// First few characters of a token, for log lines. Never log the raw value.
pub fn token_prefix(token: &str) -> String {
    let head: String = token.chars().take(6).collect();
    format!("{}…", head)
}

/// The access/refresh token pair. Exactly one live instance per process,
/// superseded in place on every successful refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    /// Provider-reported expiry; never fabricated locally.
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &token_prefix(&self.access_token))
            .field("refresh_token", &token_prefix(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// Lifecycle notifications for the orchestrator.
#[derive(Clone)]
pub enum TokenEvent {
    /// Tokens swapped; dependent connections should reconnect with the new one.
    Refreshed { old_token: String, new_token: String },
    /// Refresh token rejected. Manual re-authentication required.
    AuthRequired,
    /// Transient refresh failure after exhausting retries.
    RefreshFailed { error: String },
    /// Periodic validation could not recover the credential at all.
    Dead,
}

impl fmt::Debug for TokenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenEvent::Refreshed { old_token, new_token } => f
                .debug_struct("Refreshed")
                .field("old_token", &token_prefix(old_token))
                .field("new_token", &token_prefix(new_token))
                .finish(),
            TokenEvent::AuthRequired => f.write_str("AuthRequired"),
            TokenEvent::RefreshFailed { error } => {
                f.debug_struct("RefreshFailed").field("error", error).finish()
            }
            TokenEvent::Dead => f.write_str("Dead"),
        }
    }
}

/// Result of one introspection call. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub reason: Option<String>,
    pub expires_in: Option<u64>,
    pub login: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider rejected the token (HTTP 401).
    #[error("token rejected by identity provider")]
    Unauthorized,
    #[error("identity provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub expires_in: u64,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Seam to the identity provider, mockable in tests.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn validate(&self, access_token: &str) -> Result<ValidateResponse, IdentityError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, IdentityError>;
}

/// The real thing: Twitch's OAuth2 endpoints.
pub struct TwitchIdentity {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    validate_url: String,
    token_url: String,
}

impl TwitchIdentity {
    pub fn new(config: &TokenConfig, client_id: &str, client_secret: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            validate_url: config.validate_url.clone(),
            token_url: config.token_url.clone(),
        }
    }
}

#[async_trait]
impl IdentityApi for TwitchIdentity {
    async fn validate(&self, access_token: &str) -> Result<ValidateResponse, IdentityError> {
        let resp = self
            .client
            .get(&self.validate_url)
            .header("Authorization", format!("OAuth {}", access_token))
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(IdentityError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<ValidateResponse>()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, IdentityError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let resp = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(IdentityError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))
    }
}

/// Shared outcome of one refresh exchange; every concurrent caller gets it.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed { old_token: String, new_token: String },
    AuthRequired,
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

pub struct TokenManager {
    identity: Arc<dyn IdentityApi>,
    config: TokenConfig,
    client_id: String,
    tokens_path: PathBuf,
    credential: RwLock<Option<Credential>>,
    /// At-most-one-concurrent-refresh guard. While a refresh is in flight
    /// this holds the sender every other caller subscribes to.
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
    events: broadcast::Sender<TokenEvent>,
    http: reqwest::Client,
}

impl TokenManager {
    pub fn new(config: TokenConfig, client_id: String, identity: Arc<dyn IdentityApi>) -> Self {
        let (events, _) = broadcast::channel(16);
        let tokens_path = PathBuf::from(&config.tokens_path);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            identity,
            config,
            client_id,
            tokens_path,
            credential: RwLock::new(None),
            in_flight: Mutex::new(None),
            events,
            http,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: TokenEvent) {
        // No receiver is fine (tests, early startup).
        let _ = self.events.send(event);
    }

    pub async fn access_token(&self) -> Option<String> {
        self.credential
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    /// Load the credential from the persisted store, falling back to the
    /// environment. Fails when neither source yields a refresh token; the
    /// caller must not connect chat transport in that case.
    pub async fn load(&self) -> anyhow::Result<()> {
        if self.tokens_path.exists() {
            match std::fs::read_to_string(&self.tokens_path)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<Credential>(&s).map_err(Into::into))
            {
                Ok(cred) => {
                    info!(
                        access = %token_prefix(&cred.access_token),
                        "Tokens loaded from {}",
                        self.tokens_path.display()
                    );
                    *self.credential.write().await = Some(cred);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Could not read token store, falling back to env: {}", e);
                }
            }
        }

        let access = std::env::var("TWITCH_ACCESS_TOKEN").unwrap_or_default();
        let refresh = std::env::var("TWITCH_REFRESH_TOKEN").unwrap_or_default();
        if access.is_empty() || refresh.is_empty() {
            anyhow::bail!(
                "no usable tokens: neither {} nor TWITCH_ACCESS_TOKEN/TWITCH_REFRESH_TOKEN are set",
                self.tokens_path.display()
            );
        }

        let cred = Credential {
            access_token: access,
            refresh_token: refresh,
            expires_at: None,
            last_updated: Utc::now(),
        };
        self.save(&cred)?;
        info!(access = %token_prefix(&cred.access_token), "Tokens loaded from environment");
        *self.credential.write().await = Some(cred);
        Ok(())
    }

    /// Persist with owner-only permissions.
    fn save(&self, cred: &Credential) -> anyhow::Result<()> {
        if let Some(dir) = self.tokens_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(cred)?;
        std::fs::write(&self.tokens_path, json)?;
        restrict_permissions(&self.tokens_path)?;
        Ok(())
    }

    /// Introspect the current access token. Refreshes proactively when the
    /// remaining lifetime drops under the refresh-ahead window.
    pub async fn validate(&self) -> Validation {
        let Some(token) = self.access_token().await else {
            return Validation {
                valid: false,
                reason: Some("no access token loaded".to_string()),
                expires_in: None,
                login: None,
            };
        };

        match self.identity.validate(&token).await {
            Ok(resp) => {
                {
                    let mut guard = self.credential.write().await;
                    if let Some(cred) = guard.as_mut() {
                        cred.expires_at =
                            Some(Utc::now() + chrono::Duration::seconds(resp.expires_in as i64));
                    }
                }
                info!(
                    login = %resp.login,
                    expires_in_mins = resp.expires_in / 60,
                    "Token valid"
                );

                if resp.expires_in < self.config.refresh_ahead_secs {
                    info!("Token expires soon, refreshing proactively");
                    let _ = self.refresh().await;
                }

                Validation {
                    valid: true,
                    reason: None,
                    expires_in: Some(resp.expires_in),
                    login: Some(resp.login),
                }
            }
            Err(IdentityError::Unauthorized) => Validation {
                valid: false,
                reason: Some("token expired or revoked".to_string()),
                expires_in: None,
                login: None,
            },
            Err(e) => Validation {
                valid: false,
                reason: Some(e.to_string()),
                expires_in: None,
                login: None,
            },
        }
    }

    /// Exchange the refresh token for a new pair. Single-flight: a call
    /// arriving while a refresh is already running awaits that outcome
    /// instead of issuing a second network exchange.
    pub async fn refresh(&self) -> RefreshOutcome {
        let tx = {
            let mut guard = self.in_flight.lock().await;
            if let Some(tx) = guard.as_ref() {
                let mut rx = tx.subscribe();
                drop(guard);
                return match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => RefreshOutcome::Failed("refresh aborted".to_string()),
                };
            }
            let (tx, _rx) = broadcast::channel(4);
            *guard = Some(tx.clone());
            tx
        };

        let outcome = self.do_refresh().await;

        let mut guard = self.in_flight.lock().await;
        *guard = None;
        let _ = tx.send(outcome.clone());
        outcome
    }

    async fn do_refresh(&self) -> RefreshOutcome {
        let Some(refresh_token) = self
            .credential
            .read()
            .await
            .as_ref()
            .map(|c| c.refresh_token.clone())
        else {
            return RefreshOutcome::Failed("no refresh token loaded".to_string());
        };

        let max_attempts = self.config.max_refresh_attempts.max(1);
        let delay = Duration::from_secs(self.config.refresh_retry_delay_secs);

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "Refreshing token");

            match self.identity.refresh(&refresh_token).await {
                Ok(resp) => {
                    let old_token;
                    {
                        let mut guard = self.credential.write().await;
                        let cred = guard.get_or_insert_with(|| Credential {
                            access_token: String::new(),
                            refresh_token: String::new(),
                            expires_at: None,
                            last_updated: Utc::now(),
                        });
                        old_token = cred.access_token.clone();
                        cred.access_token = resp.access_token.clone();
                        cred.refresh_token = resp.refresh_token.clone();
                        cred.expires_at =
                            Some(Utc::now() + chrono::Duration::seconds(resp.expires_in as i64));
                        cred.last_updated = Utc::now();
                        if let Err(e) = self.save(cred) {
                            warn!("Could not persist refreshed tokens: {}", e);
                        }
                    }
                    info!(
                        new = %token_prefix(&resp.access_token),
                        expires_in_h = resp.expires_in / 3600,
                        "Token refreshed"
                    );
                    self.emit(TokenEvent::Refreshed {
                        old_token: old_token.clone(),
                        new_token: resp.access_token.clone(),
                    });
                    return RefreshOutcome::Refreshed {
                        old_token,
                        new_token: resp.access_token,
                    };
                }
                Err(IdentityError::Unauthorized) => {
                    error!("Refresh token rejected; manual re-authentication required");
                    self.emit(TokenEvent::AuthRequired);
                    return RefreshOutcome::AuthRequired;
                }
                Err(e) => {
                    warn!(attempt, "Token refresh failed: {}", e);
                    if attempt < max_attempts {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    self.emit(TokenEvent::RefreshFailed {
                        error: e.to_string(),
                    });
                    return RefreshOutcome::Failed(e.to_string());
                }
            }
        }
        unreachable!("refresh loop always returns")
    }

    /// Validate now, then on a fixed interval until shutdown. A failed
    /// validation triggers a refresh; a terminal (non-AuthRequired) refresh
    /// failure escalates to `Dead`.
    pub fn spawn_auto_validation(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(manager.config.validate_interval_secs);
        tokio::spawn(async move {
            info!(mins = interval.as_secs() / 60, "Auto-validation started");
            loop {
                let validation = manager.validate().await;
                if !validation.valid {
                    warn!(
                        reason = validation.reason.as_deref().unwrap_or("unknown"),
                        "Token invalid, attempting refresh"
                    );
                    match manager.refresh().await {
                        RefreshOutcome::Refreshed { .. } | RefreshOutcome::AuthRequired => {}
                        RefreshOutcome::Failed(_) => {
                            error!("Credential can no longer authenticate");
                            manager.emit(TokenEvent::Dead);
                        }
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => {
                        info!("Auto-validation stopped");
                        return;
                    }
                }
            }
        })
    }

    /// Send an authenticated Helix request. On a 401 response, performs
    /// exactly one refresh + retry of the original request.
    pub async fn authenticated_request(
        &self,
        method: Method,
        url: &str,
    ) -> anyhow::Result<reqwest::Response> {
        self.send_authenticated(method, url, true).await
    }

    async fn send_authenticated(
        &self,
        method: Method,
        url: &str,
        retry: bool,
    ) -> anyhow::Result<reqwest::Response> {
        let token = self
            .access_token()
            .await
            .ok_or_else(|| anyhow::anyhow!("no access token loaded"))?;

        let resp = self
            .http
            .request(method.clone(), url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Client-Id", &self.client_id)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if resp.status().as_u16() == 401 && retry {
            info!("401 from API, refreshing token and retrying once");
            if self.refresh().await.is_refreshed() {
                return Box::pin(self.send_authenticated(method, url, false)).await;
            }
        }

        Ok(resp)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted identity provider in the spirit of a mock LLM provider:
    /// counts calls and plays back configured outcomes.
    struct MockIdentity {
        refresh_calls: AtomicU32,
        validate_calls: AtomicU32,
        /// Remaining failures before refresh starts succeeding; u32::MAX
        /// means "fail forever", and `unauthorized` wins over everything.
        fail_refreshes: AtomicU32,
        unauthorized: bool,
        validate_expires_in: u64,
        refresh_delay_ms: u64,
    }

    impl MockIdentity {
        fn ok() -> Self {
            Self {
                refresh_calls: AtomicU32::new(0),
                validate_calls: AtomicU32::new(0),
                fail_refreshes: AtomicU32::new(0),
                unauthorized: false,
                validate_expires_in: 4 * 3600,
                refresh_delay_ms: 0,
            }
        }

        fn with_refresh_delay(ms: u64) -> Self {
            Self {
                refresh_delay_ms: ms,
                ..Self::ok()
            }
        }

        fn unauthorized() -> Self {
            Self {
                unauthorized: true,
                ..Self::ok()
            }
        }

        fn failing(times: u32) -> Self {
            Self {
                fail_refreshes: AtomicU32::new(times),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl IdentityApi for MockIdentity {
        async fn validate(&self, _access_token: &str) -> Result<ValidateResponse, IdentityError> {
            self.validate_calls.fetch_add(1, Ordering::SeqCst);
            if self.unauthorized {
                return Err(IdentityError::Unauthorized);
            }
            Ok(ValidateResponse {
                expires_in: self.validate_expires_in,
                login: "manolitozurrapa".to_string(),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, IdentityError> {
            let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.refresh_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.refresh_delay_ms)).await;
            }
            if self.unauthorized {
                return Err(IdentityError::Unauthorized);
            }
            let remaining = self.fail_refreshes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_refreshes.store(remaining - 1, Ordering::SeqCst);
                return Err(IdentityError::Network("connection reset".to_string()));
            }
            Ok(TokenResponse {
                access_token: format!("new-access-{}", call),
                refresh_token: format!("new-refresh-{}", call),
                expires_in: 4 * 3600,
            })
        }
    }

    fn manager_with(identity: MockIdentity, dir: &tempfile::TempDir) -> Arc<TokenManager> {
        let config = TokenConfig {
            tokens_path: dir
                .path()
                .join("tokens.json")
                .to_string_lossy()
                .into_owned(),
            refresh_retry_delay_secs: 0,
            ..TokenConfig::default()
        };
        Arc::new(TokenManager::new(
            config,
            "client-id".to_string(),
            Arc::new(identity),
        ))
    }

    async fn seed(manager: &TokenManager) {
        let cred = Credential {
            access_token: "seed-access-token".to_string(),
            refresh_token: "seed-refresh-token".to_string(),
            expires_at: None,
            last_updated: Utc::now(),
        };
        manager.save(&cred).unwrap();
        *manager.credential.write().await = Some(cred);
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::ok(), &dir);
        seed(&manager).await;
        *manager.credential.write().await = None;

        manager.load().await.unwrap();
        let first = manager.credential().await.unwrap();
        manager.load().await.unwrap();
        let second = manager.credential().await.unwrap();
        assert_eq!(first.access_token, second.access_token);
        assert_eq!(first.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn persisted_credential_roundtrips_to_second_precision() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::ok(), &dir);
        let cred = Credential {
            access_token: "abc123".to_string(),
            refresh_token: "def456".to_string(),
            expires_at: Some(Utc::now()),
            last_updated: Utc::now(),
        };
        manager.save(&cred).unwrap();
        *manager.credential.write().await = None;
        manager.load().await.unwrap();

        let loaded = manager.credential().await.unwrap();
        assert_eq!(loaded.access_token, cred.access_token);
        assert_eq!(loaded.refresh_token, cred.refresh_token);
        assert_eq!(
            loaded.expires_at.map(|d| d.timestamp()),
            cred.expires_at.map(|d| d.timestamp())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn token_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::ok(), &dir);
        seed(&manager).await;
        let meta = std::fs::metadata(&manager.tokens_path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_network_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::with_refresh_delay(50), &dir);
        seed(&manager).await;

        let m1 = Arc::clone(&manager);
        let m2 = Arc::clone(&manager);
        let (a, b) = tokio::join!(m1.refresh(), m2.refresh());

        match (&a, &b) {
            (
                RefreshOutcome::Refreshed { new_token: t1, .. },
                RefreshOutcome::Refreshed { new_token: t2, .. },
            ) => assert_eq!(t1, t2),
            other => panic!("expected two refreshed outcomes, got {:?}", other),
        }
        assert_eq!(
            manager.access_token().await.unwrap(),
            "new-access-1",
            "a second network exchange would have produced new-access-2"
        );
    }

    #[tokio::test]
    async fn refresh_401_emits_auth_required_once_and_never_retries() {
        let dir = tempfile::tempdir().unwrap();
        let identity = MockIdentity::unauthorized();
        let manager = manager_with(identity, &dir);
        seed(&manager).await;
        let mut events = manager.subscribe();

        assert!(matches!(manager.refresh().await, RefreshOutcome::AuthRequired));
        assert!(matches!(
            events.try_recv().unwrap(),
            TokenEvent::AuthRequired
        ));
        assert!(events.try_recv().is_err(), "exactly one event per occurrence");

        // a later refresh fails the same way until tokens are replaced externally
        assert!(matches!(manager.refresh().await, RefreshOutcome::AuthRequired));
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::failing(2), &dir);
        seed(&manager).await;

        let outcome = manager.refresh().await;
        assert!(outcome.is_refreshed());
        // two failures consumed, third attempt carried the exchange
        assert_eq!(manager.access_token().await.unwrap(), "new-access-3");
    }

    #[tokio::test]
    async fn exhausted_retries_emit_refresh_failed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::failing(u32::MAX), &dir);
        seed(&manager).await;
        let mut events = manager.subscribe();

        assert!(matches!(manager.refresh().await, RefreshOutcome::Failed(_)));
        assert!(matches!(
            events.try_recv().unwrap(),
            TokenEvent::RefreshFailed { .. }
        ));
        // old credential untouched
        assert_eq!(manager.access_token().await.unwrap(), "seed-access-token");
    }

    #[tokio::test]
    async fn validate_refreshes_proactively_when_expiring_soon() {
        let dir = tempfile::tempdir().unwrap();
        let identity = MockIdentity {
            validate_expires_in: 120, // well under the 1h refresh-ahead window
            ..MockIdentity::ok()
        };
        let manager = manager_with(identity, &dir);
        seed(&manager).await;

        let validation = manager.validate().await;
        assert!(validation.valid);
        assert_eq!(manager.access_token().await.unwrap(), "new-access-1");
    }

    #[tokio::test]
    async fn validate_updates_expiry_from_provider() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockIdentity::ok(), &dir);
        seed(&manager).await;
        assert!(manager.credential().await.unwrap().expires_at.is_none());

        let validation = manager.validate().await;
        assert!(validation.valid);
        assert_eq!(validation.login.as_deref(), Some("manolitozurrapa"));
        assert!(manager.credential().await.unwrap().expires_at.is_some());
    }

    #[test]
    fn debug_output_masks_tokens() {
        let cred = Credential {
            access_token: "supersecretaccesstoken".to_string(),
            refresh_token: "supersecretrefreshtoken".to_string(),
            expires_at: None,
            last_updated: Utc::now(),
        };
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("supersecretaccesstoken"));
        assert!(!debug.contains("supersecretrefreshtoken"));
        assert!(debug.contains("supers…"));
    }

    #[test]
    fn token_prefix_is_short_and_safe() {
        assert_eq!(token_prefix("abcdefghij"), "abcdef…");
        assert_eq!(token_prefix("ab"), "ab…");
    }
}
