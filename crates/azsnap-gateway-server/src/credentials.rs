use std::sync::Arc;
use tokio::sync::RwLock;

use azsnap_arm::TokenCredential;
use azsnap_common::GatewayError;

/// Holder for the credential obtained by the last successful login.
///
/// Requests take a clone of the current `Arc` once, up front, so a concurrent
/// login swaps the credential for later requests without affecting in-flight ones.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Arc<dyn TokenCredential>>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previously stored credential.
    pub async fn set(&self, credential: Arc<dyn TokenCredential>) {
        *self.inner.write().await = Some(credential);
    }

    pub async fn get(&self) -> Option<Arc<dyn TokenCredential>> {
        self.inner.read().await.clone()
    }

    pub async fn require(&self) -> Result<Arc<dyn TokenCredential>, GatewayError> {
        self.get().await.ok_or(GatewayError::AuthenticationRequired)
    }
}
