//! Seams between the HTTP handlers and the cloud.
//!
//! Handlers never talk to the identity provider or the compute API directly:
//! they go through [`IdentityProvider`] to log in and [`ClientFactory`] to get a
//! snapshots client bound to the stored credential.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use azsnap_arm::{
    ClientOptions, DeviceCodeCredential, DeviceCodeCredentialOptions, DeviceCodeInfo,
    SnapshotsApi, SnapshotsClient, TokenCredential,
};

use crate::config::GatewayConfig;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Performs a full interactive login and returns the credential to store.
    async fn login(&self) -> azsnap_arm::Result<Arc<dyn TokenCredential>>;
}

pub trait ClientFactory: Send + Sync {
    fn snapshots_client(
        &self,
        credential: Arc<dyn TokenCredential>,
    ) -> azsnap_arm::Result<Arc<dyn SnapshotsApi>>;
}

/// Device-code login. The instructions go to stdout and the log; the call
/// returns once the user has finished signing in elsewhere.
pub struct DeviceCodeLogin {
    tenant_id: String,
    client_id: String,
    authority_host: String,
}

impl DeviceCodeLogin {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            authority_host: config.authority_host.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for DeviceCodeLogin {
    async fn login(&self) -> azsnap_arm::Result<Arc<dyn TokenCredential>> {
        let options = DeviceCodeCredentialOptions::new(&self.tenant_id, &self.client_id)
            .with_authority_host(&self.authority_host)
            .with_user_prompt(Arc::new(|info: &DeviceCodeInfo| {
                println!("{}", info.message);
                info!(user_code = %info.user_code, verification_uri = %info.verification_uri, "waiting for device code login");
            }));

        let credential = DeviceCodeCredential::new(options)?;
        credential.authenticate().await?;
        Ok(Arc::new(credential))
    }
}

/// Builds ARM snapshots clients for the configured subscription.
pub struct ArmClientFactory {
    subscription_id: String,
    options: ClientOptions,
}

impl ArmClientFactory {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            subscription_id: config.subscription_id.clone(),
            options: ClientOptions {
                endpoint: config.resource_manager_endpoint.clone(),
                ..Default::default()
            },
        }
    }
}

impl ClientFactory for ArmClientFactory {
    fn snapshots_client(
        &self,
        credential: Arc<dyn TokenCredential>,
    ) -> azsnap_arm::Result<Arc<dyn SnapshotsApi>> {
        let client = SnapshotsClient::new(&self.subscription_id, credential, self.options.clone())?;
        Ok(Arc::new(client))
    }
}
