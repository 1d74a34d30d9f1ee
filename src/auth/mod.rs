// Authentication module
// Manages the OAuth token lifecycle, persistence and authorization flows

mod flow;
mod manager;
mod refresh;
mod store;
mod types;

pub use flow::{
    AuthorizationFlows, BrowserLauncher, FlowMessage, PendingAuthorization, SystemBrowser,
    DEFAULT_AUTHORIZATION_TIMEOUT_SECS,
};
pub use manager::TokenManager;
pub use store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
pub use types::{OAuthSettings, TokenData, TokenResponse, TokenState, DEFAULT_EXPIRES_IN_SECS};
