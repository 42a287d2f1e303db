use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::credential::{parse_base_url, TokenCredential, ARM_SCOPE};
use crate::error::{ensure_success, ArmError, Result};
use crate::models::{Snapshot, SnapshotListPage};
use crate::operation::{LongRunningOperation, Operation};

pub const API_VERSION: &str = "2023-04-02";
pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint: String,
    pub api_version: String,
    /// Delay between status polls when the service sends no `Retry-After`.
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string(),
            api_version: API_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Snapshot operations of the compute control plane.
#[async_trait]
pub trait SnapshotsApi: Send + Sync {
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        snapshot: Snapshot,
    ) -> Result<Box<dyn LongRunningOperation>>;

    async fn begin_delete(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Box<dyn LongRunningOperation>>;

    async fn get(&self, resource_group: &str, name: &str) -> Result<Snapshot>;

    /// Fetches the first listing page when `next_link` is `None`, else the linked page.
    async fn list_page(&self, next_link: Option<&str>) -> Result<SnapshotListPage>;
}

/// ARM REST implementation of [`SnapshotsApi`], scoped to one subscription.
pub struct SnapshotsClient {
    http: Client,
    endpoint: Url,
    subscription_id: String,
    credential: Arc<dyn TokenCredential>,
    options: ClientOptions,
}

impl SnapshotsClient {
    pub fn new(
        subscription_id: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        options: ClientOptions,
    ) -> Result<Self> {
        let subscription_id = subscription_id.into();
        if subscription_id.trim().is_empty() {
            return Err(ArmError::InvalidConfig(
                "subscription id is empty".to_string(),
            ));
        }
        let endpoint = parse_base_url(&options.endpoint)?;

        Ok(Self {
            http: Client::new(),
            endpoint,
            subscription_id,
            credential,
            options,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ArmError::InvalidConfig("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["subscriptions", self.subscription_id.as_str()])
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("api-version", &self.options.api_version);
        Ok(url)
    }

    fn snapshot_url(&self, resource_group: &str, name: &str) -> Result<Url> {
        self.url(&[
            "resourceGroups",
            resource_group,
            "providers",
            "Microsoft.Compute",
            "snapshots",
            name,
        ])
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.credential.get_token(&[ARM_SCOPE]).await?.token)
    }
}

#[async_trait]
impl SnapshotsApi for SnapshotsClient {
    #[instrument(skip(self, snapshot))]
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        snapshot: Snapshot,
    ) -> Result<Box<dyn LongRunningOperation>> {
        let url = self.snapshot_url(resource_group, name)?;
        let response = self
            .http
            .put(url.clone())
            .bearer_auth(self.bearer().await?)
            .json(&snapshot)
            .send()
            .await?;

        let operation = Operation::from_response(
            self.http.clone(),
            Method::PUT,
            self.credential.clone(),
            self.options.poll_interval,
            url,
            response,
        )
        .await?;
        Ok(Box::new(operation))
    }

    #[instrument(skip(self))]
    async fn begin_delete(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Box<dyn LongRunningOperation>> {
        let url = self.snapshot_url(resource_group, name)?;
        let response = self
            .http
            .delete(url.clone())
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;

        let operation = Operation::from_response(
            self.http.clone(),
            Method::DELETE,
            self.credential.clone(),
            self.options.poll_interval,
            url,
            response,
        )
        .await?;
        Ok(Box::new(operation))
    }

    #[instrument(skip(self))]
    async fn get(&self, resource_group: &str, name: &str) -> Result<Snapshot> {
        let response = self
            .http
            .get(self.snapshot_url(resource_group, name)?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn list_page(&self, next_link: Option<&str>) -> Result<SnapshotListPage> {
        let url = match next_link {
            Some(link) => Url::parse(link)
                .map_err(|e| ArmError::InvalidConfig(format!("invalid nextLink {link:?}: {e}")))?,
            None => self.url(&["providers", "Microsoft.Compute", "snapshots"])?,
        };
        debug!(%url, "fetching snapshot page");

        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}
