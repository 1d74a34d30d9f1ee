// Error handling module
// Defines the error taxonomy and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the token lifecycle and property resolution
#[derive(Error, Debug)]
pub enum GscError {
    /// The authorization URL could not be opened
    #[error("Authorization window could not be opened: {0}")]
    PopupBlocked(String),

    /// No completion message arrived within the bounded wait
    #[error("Authorization timed out after {0} seconds")]
    AuthorizationTimeout(u64),

    /// The user abandoned the flow or the provider refused it
    #[error("Authorization cancelled: {0}")]
    AuthorizationCancelled(String),

    /// Authorization code exchange was rejected
    #[error("Token exchange failed: {status} - {message}")]
    TokenExchange { status: u16, message: String },

    /// Refresh token exchange was rejected
    #[error("Token refresh failed: {status} - {message}")]
    RefreshFailed { status: u16, message: String },

    /// A refresh is required but no refresh token is stored
    #[error("No refresh token available, re-authorization required")]
    NoRefreshToken,

    /// The API kept returning 401 after one refresh
    #[error("Authentication expired, re-authorization required")]
    AuthenticationExpired,

    /// Listing Search Console sites failed
    #[error("Failed to list Search Console properties: {0}")]
    PropertyList(String),

    /// Any other non-success response from the Search Console API
    #[error("Search Console API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Caller did not present the dashboard key
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Token store read/write failure
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GscError {
    /// Terminal token errors: the session is unusable until the user authorizes again
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            GscError::TokenExchange { .. }
                | GscError::RefreshFailed { .. }
                | GscError::NoRefreshToken
                | GscError::AuthenticationExpired
        )
    }

    /// Short machine-readable kind used in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            GscError::PopupBlocked(_) => "popup_blocked",
            GscError::AuthorizationTimeout(_) => "authorization_timeout",
            GscError::AuthorizationCancelled(_) => "authorization_cancelled",
            GscError::TokenExchange { .. } => "token_exchange_error",
            GscError::RefreshFailed { .. } => "refresh_failed",
            GscError::NoRefreshToken => "no_refresh_token",
            GscError::AuthenticationExpired => "authentication_expired",
            GscError::PropertyList(_) => "property_list_error",
            GscError::Api { .. } => "search_console_api_error",
            GscError::Unauthorized(_) => "auth_error",
            GscError::Storage(_) => "storage_error",
            GscError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for GscError {
    fn into_response(self) -> Response {
        let error_type = self.kind();
        let (status, message) = match &self {
            GscError::PopupBlocked(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            GscError::AuthorizationTimeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            GscError::AuthorizationCancelled(_) => (StatusCode::CONFLICT, self.to_string()),
            GscError::TokenExchange { .. }
            | GscError::RefreshFailed { .. }
            | GscError::NoRefreshToken
            | GscError::AuthenticationExpired => (StatusCode::UNAUTHORIZED, self.to_string()),
            GscError::PropertyList(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            GscError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            GscError::Api { status, message } => {
                let status_code = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                (status_code, message.clone())
            }
            GscError::Storage(_) | GscError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for token and property operations
pub type Result<T> = std::result::Result<T, GscError>;
