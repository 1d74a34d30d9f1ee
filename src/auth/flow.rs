// Pending authorization flows
//
// Each flow waits on a one-shot channel keyed by its id. The redirect callback
// completes it; it is cancelled by the bounded timeout or by a focus-regained
// signal from the UI. Focus-regained is best-effort: the initiating window can
// regain focus for reasons unrelated to the consent page.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::manager::TokenManager;
use crate::error::{GscError, Result};

/// Default bounded wait for the consent page
pub const DEFAULT_AUTHORIZATION_TIMEOUT_SECS: u64 = 300;

/// Message delivered to a waiting flow
#[derive(Debug, Clone, PartialEq)]
pub enum FlowMessage {
    /// Redirect arrived with an authorization code
    Completed { code: String },
    /// Redirect arrived with a provider error (e.g. `access_denied`)
    Failed { error: String },
    /// The initiating window regained focus without a completion
    FocusRegained,
}

/// Opens the authorization URL in a user-visible context
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Launches the system browser via the platform opener command
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(target_os = "windows") {
            "explorer"
        } else {
            "xdg-open"
        };

        std::process::Command::new(program)
            .arg(url)
            .spawn()
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Failed to launch {}: {}", program, e))
    }
}

/// Registry of in-flight authorization flows
#[derive(Clone)]
pub struct AuthorizationFlows {
    pending: Arc<DashMap<Uuid, oneshot::Sender<FlowMessage>>>,
    timeout: Duration,
}

/// A started flow waiting for its completion message
pub struct PendingAuthorization {
    pub flow_id: Uuid,
    pub authorization_url: url::Url,
    receiver: oneshot::Receiver<FlowMessage>,
    pending: Arc<DashMap<Uuid, oneshot::Sender<FlowMessage>>>,
}

impl AuthorizationFlows {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a new flow and build its consent URL
    pub fn begin(&self, tokens: &TokenManager) -> Result<PendingAuthorization> {
        let flow_id = Uuid::new_v4();
        let authorization_url = tokens.authorization_url(&flow_id.to_string())?;

        let (sender, receiver) = oneshot::channel();
        self.pending.insert(flow_id, sender);
        tracing::info!(flow_id = %flow_id, "Authorization flow started");

        Ok(PendingAuthorization {
            flow_id,
            authorization_url,
            receiver,
            pending: self.pending.clone(),
        })
    }

    /// Deliver an authorization code. Returns false for unknown flows.
    pub fn complete(&self, flow_id: Uuid, code: String) -> bool {
        self.deliver(flow_id, FlowMessage::Completed { code })
    }

    /// Deliver a provider error. Returns false for unknown flows.
    pub fn fail(&self, flow_id: Uuid, error: String) -> bool {
        self.deliver(flow_id, FlowMessage::Failed { error })
    }

    /// Signal that the initiating window regained focus
    pub fn focus_regained(&self, flow_id: Uuid) -> bool {
        self.deliver(flow_id, FlowMessage::FocusRegained)
    }

    /// Drop a flow without delivering anything
    pub fn discard(&self, flow_id: Uuid) {
        self.pending.remove(&flow_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn deliver(&self, flow_id: Uuid, message: FlowMessage) -> bool {
        match self.pending.remove(&flow_id) {
            Some((_, sender)) => sender.send(message).is_ok(),
            None => {
                tracing::warn!(flow_id = %flow_id, "Message for unknown authorization flow");
                false
            }
        }
    }
}

impl PendingAuthorization {
    /// Wait for the completion message and return the authorization code
    pub async fn wait(self, timeout: Duration) -> Result<String> {
        let flow_id = self.flow_id;
        let result = tokio::time::timeout(timeout, self.receiver).await;

        // Every exit path leaves the registry clean so a new flow can start
        self.pending.remove(&flow_id);

        match result {
            Ok(Ok(FlowMessage::Completed { code })) => {
                tracing::info!(flow_id = %flow_id, "Authorization code received");
                Ok(code)
            }
            Ok(Ok(FlowMessage::Failed { error })) => {
                tracing::warn!(flow_id = %flow_id, error = %error, "Provider rejected authorization");
                Err(GscError::AuthorizationCancelled(error))
            }
            Ok(Ok(FlowMessage::FocusRegained)) => {
                tracing::info!(flow_id = %flow_id, "Window regained focus without completion");
                Err(GscError::AuthorizationCancelled(
                    "window closed before authorization completed".to_string(),
                ))
            }
            Ok(Err(_)) => Err(GscError::AuthorizationCancelled(
                "authorization flow was discarded".to_string(),
            )),
            Err(_) => {
                tracing::warn!(flow_id = %flow_id, "Authorization timed out");
                Err(GscError::AuthorizationTimeout(timeout.as_secs()))
            }
        }
    }
}
