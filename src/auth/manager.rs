use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::flow::{AuthorizationFlows, BrowserLauncher};
use super::refresh;
use super::store::TokenStore;
use super::types::{OAuthSettings, TokenData, TokenState};
use crate::error::{GscError, Result};

/// Token lifecycle manager
/// Owns the session token state, persists every change and refreshes before expiry
pub struct TokenManager {
    /// Current session state
    state: RwLock<TokenState>,

    /// Persistence backend
    store: Arc<dyn TokenStore>,

    /// Serializes refreshes so concurrent callers share one
    refresh_lock: Mutex<()>,

    /// OAuth client settings
    settings: OAuthSettings,

    /// HTTP client for token endpoint requests
    client: Client,

    /// Token refresh threshold in seconds (default: 300 = 5 minutes)
    refresh_threshold: i64,
}

impl TokenManager {
    /// Create a manager, loading any persisted session from the store
    pub fn new(
        settings: OAuthSettings,
        store: Arc<dyn TokenStore>,
        refresh_threshold: u64,
    ) -> anyhow::Result<Self> {
        let state = store.load().context("Failed to load persisted token state")?;
        if state.access_token.is_some() {
            tracing::info!(
                "Loaded persisted session (expires: {})",
                state
                    .expires_at
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            state: RwLock::new(state),
            store,
            refresh_lock: Mutex::new(()),
            settings,
            client,
            refresh_threshold: refresh_threshold as i64,
        })
    }

    /// Build the consent URL for a flow; `state` carries the flow id
    pub fn authorization_url(&self, state: &str) -> anyhow::Result<url::Url> {
        let scope = self.settings.scopes.join(" ");
        url::Url::parse_with_params(
            &self.settings.auth_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .with_context(|| format!("Invalid authorization URL: {}", self.settings.auth_url))
    }

    /// Run a full authorization flow: open the consent page, wait for the
    /// redirect callback, then exchange the code
    pub async fn initiate_authorization(
        &self,
        flows: &AuthorizationFlows,
        launcher: &dyn BrowserLauncher,
    ) -> Result<()> {
        let pending = flows.begin(self)?;

        if let Err(e) = launcher.open(pending.authorization_url.as_str()) {
            tracing::warn!("Failed to open authorization URL: {:#}", e);
            flows.discard(pending.flow_id);
            return Err(GscError::PopupBlocked(e.to_string()));
        }

        let code = pending.wait(flows.timeout()).await?;
        self.exchange_code_for_tokens(&code).await
    }

    /// Trade an authorization code for tokens and persist them
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<()> {
        let data = refresh::exchange_authorization_code(&self.client, &self.settings, code).await?;
        if data.refresh_token.is_none() {
            tracing::warn!("Token exchange returned no refresh token; session cannot be refreshed");
        }

        let mut state = self.state.write().await;
        let mut next = TokenState::default();
        next.apply(data);
        self.persist(&next).await?;
        *state = next;

        tracing::info!("Authorization complete");
        Ok(())
    }

    /// Access token present and either still valid or recoverable by refresh
    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.read().await;
        state.access_token.is_some()
            && (!state.is_expired(Utc::now()) || state.refresh_token.is_some())
    }

    /// Expiry of the current access token, if any
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.expires_at
    }

    /// Check if token is expiring soon (within threshold)
    async fn is_token_expiring_soon(&self) -> bool {
        let state = self.state.read().await;
        state.access_token.is_none() || state.expires_within(Utc::now(), self.refresh_threshold)
    }

    /// Get a valid access token, refreshing first if it expires within the threshold
    ///
    /// Concurrent callers share a single refresh: whoever takes the refresh lock
    /// second re-checks expiry and reuses the fresh token.
    pub async fn ensure_valid_token(&self) -> Result<String> {
        if self.is_token_expiring_soon().await {
            let _guard = self.refresh_lock.lock().await;

            if self.is_token_expiring_soon().await {
                tracing::debug!("Access token expiring within {}s, refreshing", self.refresh_threshold);
                return self.refresh_locked().await;
            }
            tracing::debug!("Token already refreshed by a concurrent caller");
        }

        let state = self.state.read().await;
        state.access_token.clone().ok_or(GscError::NoRefreshToken)
    }

    /// Exchange the refresh token for a new access token (one network call)
    ///
    /// On failure the caller decides whether to `sign_out`.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh body; caller must hold `refresh_lock`
    async fn refresh_locked(&self) -> Result<String> {
        let refresh_token = {
            let state = self.state.read().await;
            state.refresh_token.clone().ok_or(GscError::NoRefreshToken)?
        };

        let data: TokenData =
            refresh::refresh_access_token(&self.client, &self.settings, &refresh_token).await?;
        let access_token = data.access_token.clone();

        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.apply(data);
        self.persist(&next).await?;
        *state = next;

        Ok(access_token)
    }

    /// Clear all token state. No network call; never fails.
    pub async fn sign_out(&self) {
        let mut state = self.state.write().await;
        state.clear();

        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.clear()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Failed to clear persisted tokens: {:#}", e),
            Err(e) => tracing::error!("Token store task failed: {}", e),
        }
        tracing::info!("Signed out");
    }

    /// Write a state to the store on the blocking pool
    ///
    /// Callers hold the state write guard so memory and storage change in the
    /// same order.
    async fn persist(&self, state: &TokenState) -> Result<()> {
        let store = self.store.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || store.save(&state))
            .await
            .map_err(|e| GscError::Internal(anyhow::anyhow!("Token store task failed: {}", e)))?
            .map_err(|e| GscError::Storage(format!("{:#}", e)))
    }
}
