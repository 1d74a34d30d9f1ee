// Authentication types

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Longest lifetime accepted from the token endpoint (one year); larger values
/// are treated as missing
const MAX_EXPIRES_IN_SECS: u64 = 365 * 24 * 3600;

/// OAuth client settings (static configuration)
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

/// Persisted session token state
///
/// If `access_token` is present, `expires_at` is present too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// True once the expiry instant has passed (or is unknown)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => now >= exp,
        }
    }

    /// True if the token expires within `threshold_secs` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => exp <= now + Duration::seconds(threshold_secs),
        }
    }

    /// Apply a token endpoint result: access token and expiry replaced,
    /// refresh token kept unless a new one was issued
    pub fn apply(&mut self, data: TokenData) {
        self.access_token = Some(data.access_token);
        self.expires_at = Some(data.expires_at);
        if let Some(refresh_token) = data.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }

    pub fn clear(&mut self) {
        *self = TokenState::default();
    }
}

/// Convert epoch milliseconds to a UTC instant
pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Token data extracted from a token endpoint response
#[derive(Debug, Clone)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn into_token_data(self, now: DateTime<Utc>) -> TokenData {
        let expires_in = match self.expires_in {
            Some(secs) if secs <= MAX_EXPIRES_IN_SECS => secs,
            Some(secs) => {
                tracing::warn!(
                    "Ignoring out-of-range expires_in={}, assuming {}s",
                    secs,
                    DEFAULT_EXPIRES_IN_SECS
                );
                DEFAULT_EXPIRES_IN_SECS
            }
            None => DEFAULT_EXPIRES_IN_SECS,
        };

        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(now);

        TokenData {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scope: self.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_within_threshold() {
        let now = Utc::now();
        let state = TokenState {
            access_token: Some("token".to_string()),
            refresh_token: None,
            expires_at: Some(now + Duration::seconds(240)),
        };
        assert!(state.expires_within(now, 300));
        assert!(!state.expires_within(now, 60));
        assert!(!state.is_expired(now));
    }

    #[test]
    fn test_apply_keeps_refresh_token() {
        let now = Utc::now();
        let mut state = TokenState {
            access_token: Some("old".to_string()),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(now),
        };
        state.apply(TokenData {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_at: now + Duration::seconds(3600),
            scope: None,
        });
        assert_eq!(state.access_token.as_deref(), Some("new"));
        assert_eq!(state.refresh_token.as_deref(), Some("refresh"));

        state.apply(TokenData {
            access_token: "newer".to_string(),
            refresh_token: Some("rotated".to_string()),
            expires_at: now + Duration::seconds(3600),
            scope: None,
        });
        assert_eq!(state.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn test_missing_expires_in_defaults_to_one_hour() {
        let now = Utc::now();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","token_type":"Bearer"}"#).unwrap();
        let data = response.into_token_data(now);
        assert_eq!(data.expires_at, now + Duration::seconds(3600));
        assert!(data.refresh_token.is_none());
    }

    #[test]
    fn test_out_of_range_expires_in_falls_back_to_default() {
        let now = Utc::now();
        for raw in [
            r#"{"access_token":"abc","expires_in":10000000000000000}"#,
            r#"{"access_token":"abc","expires_in":18446744073709551615}"#,
        ] {
            let response: TokenResponse = serde_json::from_str(raw).unwrap();
            let data = response.into_token_data(now);
            assert_eq!(data.expires_at, now + Duration::seconds(3600));
        }

        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":31536000}"#).unwrap();
        assert_eq!(
            response.into_token_data(now).expires_at,
            now + Duration::seconds(31_536_000)
        );
    }

    #[test]
    fn test_epoch_millis_conversion() {
        let dt = from_epoch_millis(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
    }
}
