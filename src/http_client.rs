use anyhow::Context;
use reqwest::{header, Client, Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenManager;
use crate::error::{GscError, Result};

/// Authenticated HTTP client for the Search Console API
///
/// Every call gets at most one automatic refresh: a 401 refreshes the token
/// and resends once, a second 401 is terminal.
pub struct SearchConsoleClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Session token manager
    tokens: Arc<TokenManager>,

    /// API base URL, e.g. https://www.googleapis.com
    api_base: String,
}

impl SearchConsoleClient {
    /// Create a new client
    pub fn new(
        tokens: Arc<TokenManager>,
        api_base: impl Into<String>,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Authenticated GET returning JSON
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self
            .client
            .get(self.url(path))
            .build()
            .map_err(|e| GscError::Internal(e.into()))?;
        let response = self.execute(request).await?;
        decode(response).await
    }

    /// Authenticated POST with a JSON body, returning JSON
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.build_post(path, body)?;
        let response = self.execute(request).await?;
        decode(response).await
    }

    /// Like `post_json`, but a terminal token error is returned without
    /// clearing the session. For advisory calls whose failure must not sign
    /// the user out.
    pub async fn post_json_keep_session<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.build_post(path, body)?;
        let response = self.execute_inner(request).await?;
        decode(response).await
    }

    fn build_post<B: Serialize>(&self, path: &str, body: &B) -> Result<Request> {
        self.client
            .post(self.url(path))
            .json(body)
            .build()
            .map_err(|e| GscError::Internal(e.into()))
    }

    /// Execute a request with a valid bearer token, refreshing once on 401
    ///
    /// Terminal token errors clear the session before being returned.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        match self.execute_inner(request).await {
            Err(e) if e.requires_reauthorization() => {
                tracing::warn!("Terminal authentication failure, clearing session: {}", e);
                self.tokens.sign_out().await;
                Err(e)
            }
            other => other,
        }
    }

    async fn execute_inner(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let token = self.tokens.ensure_valid_token().await?;
        let response = self.send(&request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, &url).await;
        }

        tracing::warn!(url = %url, "Received 401, refreshing token and retrying once");
        let token = self.tokens.refresh_access_token().await?;

        let response = self.send(&request, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::error!(url = %url, "Received 401 again after refresh");
            return Err(GscError::AuthenticationExpired);
        }

        check_status(response, &url).await
    }

    /// Send one attempt with the given bearer token
    async fn send(&self, request: &Request, token: &str) -> Result<Response> {
        let mut req = request.try_clone().ok_or_else(|| {
            GscError::Internal(anyhow::anyhow!("Request body is not cloneable"))
        })?;

        let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| GscError::Internal(anyhow::anyhow!("Invalid bearer token: {}", e)))?;
        req.headers_mut().insert(header::AUTHORIZATION, value);

        self.client.execute(req).await.map_err(|e| {
            // Categorize the error for better debugging
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else if e.is_decode() {
                "decode_error"
            } else {
                "request_error"
            };

            tracing::warn!(
                error_kind = error_kind,
                error = %e,
                url = %request.url(),
                "HTTP request error"
            );

            GscError::Internal(anyhow::anyhow!(
                "HTTP request failed: {} (kind: {})",
                e,
                error_kind
            ))
        })
    }
}

/// Turn a non-success status into `GscError::Api`
async fn check_status(response: Response, url: &reqwest::Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        tracing::debug!(status = %status, "Request successful");
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    tracing::error!(
        status = status.as_u16(),
        url = %url,
        response_body = %error_text,
        "HTTP request failed with error response"
    );

    Err(GscError::Api {
        status: status.as_u16(),
        message: error_text,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| GscError::Internal(anyhow::anyhow!("Failed to parse API response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, OAuthSettings, TokenState};
    use chrono::{Duration as ChronoDuration, Utc};
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard, state: TokenState) -> SearchConsoleClient {
        let tokens = TokenManager::new(
            OAuthSettings {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://localhost:8000/oauth/callback".to_string(),
                scopes: vec!["scope".to_string()],
                auth_url: format!("{}/auth", server.url()),
                token_url: format!("{}/token", server.url()),
            },
            Arc::new(MemoryTokenStore::new(state)),
            300,
        )
        .unwrap();
        SearchConsoleClient::new(Arc::new(tokens), server.url(), 5, 10).unwrap()
    }

    fn valid_state() -> TokenState {
        TokenState {
            access_token: Some("old-token".to_string()),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
        }
    }

    #[tokio::test]
    async fn test_401_refreshes_and_retries_once() {
        let mut server = mockito::Server::new_async().await;
        let stale = server
            .mock("GET", "/ping")
            .match_header("authorization", "Bearer old-token")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-token","expires_in":3600,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/ping")
            .match_header("authorization", "Bearer new-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, valid_state());
        let body: serde_json::Value = client.get_json("/ping").await.unwrap();

        assert_eq!(body["ok"], true);
        stale.assert_async().await;
        refresh.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_401_is_terminal_without_third_attempt() {
        let mut server = mockito::Server::new_async().await;
        let api = server
            .mock("GET", "/ping")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-token","expires_in":3600,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, valid_state());
        let err = client
            .get_json::<serde_json::Value>("/ping")
            .await
            .unwrap_err();

        assert!(matches!(err, GscError::AuthenticationExpired));
        api.assert_async().await;
        refresh.assert_async().await;
        assert!(!client.tokens().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_failure_after_401_signs_out() {
        let mut server = mockito::Server::new_async().await;
        let api = server
            .mock("GET", "/ping")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = client_for(&server, valid_state());
        let err = client
            .get_json::<serde_json::Value>("/ping")
            .await
            .unwrap_err();

        assert!(matches!(err, GscError::RefreshFailed { status: 400, .. }));
        api.assert_async().await;
        assert!(!client.tokens().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_keep_session_post_does_not_sign_out() {
        let mut server = mockito::Server::new_async().await;
        let api = server
            .mock("POST", "/query")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let _refresh = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-token","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let client = client_for(&server, valid_state());
        let err = client
            .post_json_keep_session::<_, serde_json::Value>("/query", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, GscError::AuthenticationExpired));
        api.assert_async().await;
        assert!(client.tokens().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_other_errors_are_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client = client_for(&server, valid_state());
        let err = client
            .get_json::<serde_json::Value>("/ping")
            .await
            .unwrap_err();

        match err {
            GscError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "forbidden");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Non-auth failures keep the session
        assert!(client.tokens().is_authenticated().await);
    }
}
