// Token endpoint calls: authorization-code exchange and refresh

use chrono::Utc;
use reqwest::Client;

use super::types::{OAuthSettings, TokenData, TokenResponse};
use crate::error::{GscError, Result};

/// Which grant a token request carries
enum Grant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

impl Grant<'_> {
    fn label(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode(_) => "authorization code exchange",
            Grant::RefreshToken(_) => "token refresh",
        }
    }

    fn failure(&self, status: u16, message: String) -> GscError {
        match self {
            Grant::AuthorizationCode(_) => GscError::TokenExchange { status, message },
            Grant::RefreshToken(_) => GscError::RefreshFailed { status, message },
        }
    }
}

/// Trade an authorization code for a token pair
pub async fn exchange_authorization_code(
    client: &Client,
    settings: &OAuthSettings,
    code: &str,
) -> Result<TokenData> {
    request_token(client, settings, Grant::AuthorizationCode(code)).await
}

/// Trade the stored refresh token for a new access token
pub async fn refresh_access_token(
    client: &Client,
    settings: &OAuthSettings,
    refresh_token: &str,
) -> Result<TokenData> {
    request_token(client, settings, Grant::RefreshToken(refresh_token)).await
}

/// Single form-encoded POST to the token endpoint. Never retried.
async fn request_token(
    client: &Client,
    settings: &OAuthSettings,
    grant: Grant<'_>,
) -> Result<TokenData> {
    tracing::info!("Sending {} request to {}", grant.label(), settings.token_url);

    let mut form = vec![
        ("client_id", settings.client_id.as_str()),
        ("client_secret", settings.client_secret.as_str()),
    ];
    match grant {
        Grant::AuthorizationCode(code) => {
            form.push(("code", code));
            form.push(("grant_type", "authorization_code"));
            form.push(("redirect_uri", settings.redirect_uri.as_str()));
        }
        Grant::RefreshToken(refresh_token) => {
            form.push(("refresh_token", refresh_token));
            form.push(("grant_type", "refresh_token"));
        }
    }

    let response = match client
        .post(&settings.token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "{} request could not be sent", grant.label());
            return Err(grant.failure(0, e.to_string()));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            "{} failed: status={}, body={}",
            grant.label(),
            status,
            error_text
        );

        // Google returns {"error": "...", "error_description": "..."}
        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|v| {
                let code = v.get("error")?.as_str()?.to_string();
                Some(match v.get("error_description").and_then(|d| d.as_str()) {
                    Some(desc) => format!("{}: {}", code, desc),
                    None => code,
                })
            })
            .unwrap_or(error_text);

        return Err(grant.failure(status.as_u16(), message));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| grant.failure(status.as_u16(), format!("Malformed token response: {}", e)))?;

    if body.access_token.is_empty() {
        return Err(grant.failure(
            status.as_u16(),
            "Token response does not contain access_token".to_string(),
        ));
    }

    let data = body.into_token_data(Utc::now());
    tracing::info!(
        "{} succeeded, expires: {}",
        grant.label(),
        data.expires_at.to_rfc3339()
    );

    Ok(data)
}
