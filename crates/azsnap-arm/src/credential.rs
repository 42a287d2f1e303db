//! Device authorization grant against the Microsoft identity platform.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ArmError, Result};

pub const ARM_SCOPE: &str = "https://management.azure.com/.default";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);
/// Tokens this close to expiry are refreshed rather than handed out.
const EXPIRY_MARGIN_SECS: i64 = 120;

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccessToken {
    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - now > ChronoDuration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// Source of bearer tokens for outbound requests.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

/// Device-code response. `message` carries the user-facing login instructions.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeInfo {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: String,
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Called once with the device-code instructions before polling starts.
pub type UserPrompt = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

#[derive(Clone)]
pub struct DeviceCodeCredentialOptions {
    pub tenant_id: String,
    pub client_id: String,
    pub authority_host: String,
    pub user_prompt: Option<UserPrompt>,
}

impl DeviceCodeCredentialOptions {
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            user_prompt: None,
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    pub fn with_user_prompt(mut self, prompt: UserPrompt) -> Self {
        self.user_prompt = Some(prompt);
        self
    }
}

/// Token endpoint reply. Success and error share one shape on the wire.
#[derive(Debug, Default, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollAction {
    Continue,
    SlowDown,
    Fail,
}

impl PollAction {
    fn for_error(code: &str) -> Self {
        match code {
            "authorization_pending" => PollAction::Continue,
            "slow_down" => PollAction::SlowDown,
            _ => PollAction::Fail,
        }
    }
}

struct CachedToken {
    access: AccessToken,
    refresh_token: Option<String>,
    scope: String,
}

pub struct DeviceCodeCredential {
    http: Client,
    authority: Url,
    tenant_id: String,
    client_id: String,
    prompt: UserPrompt,
    cache: RwLock<Option<CachedToken>>,
}

impl DeviceCodeCredential {
    pub fn new(options: DeviceCodeCredentialOptions) -> Result<Self> {
        if options.tenant_id.trim().is_empty() {
            return Err(ArmError::InvalidConfig("tenant id is empty".to_string()));
        }
        if options.client_id.trim().is_empty() {
            return Err(ArmError::InvalidConfig("client id is empty".to_string()));
        }
        let authority = parse_base_url(&options.authority_host)?;
        let prompt: UserPrompt = match options.user_prompt {
            Some(prompt) => prompt,
            None => Arc::new(|info: &DeviceCodeInfo| info!("{}", info.message)),
        };

        Ok(Self {
            http: Client::new(),
            authority,
            tenant_id: options.tenant_id,
            client_id: options.client_id,
            prompt,
            cache: RwLock::new(None),
        })
    }

    /// Runs the interactive device-code flow and caches the resulting token.
    ///
    /// Blocks until the user completes login out-of-band, the provider rejects
    /// it, or the device code expires.
    pub async fn authenticate(&self) -> Result<AccessToken> {
        let scope = format!("{ARM_SCOPE} offline_access");
        let response = self
            .http
            .post(self.endpoint("devicecode")?)
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope.as_str())])
            .send()
            .await?;
        let response = crate::error::ensure_success(response).await?;
        let info: DeviceCodeInfo = response.json().await?;

        (self.prompt)(&info);

        let deadline = Instant::now() + Duration::from_secs(info.expires_in);
        let mut interval = Duration::from_secs(info.interval);
        let token_url = self.endpoint("token")?;

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                warn!("device code expired before login completed");
                return Err(ArmError::DeviceCodeExpired);
            }

            let reply: TokenEndpointResponse = self
                .http
                .post(token_url.clone())
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.client_id.as_str()),
                    ("device_code", info.device_code.as_str()),
                ])
                .send()
                .await?
                .json()
                .await?;

            if let Some(code) = reply.error.as_deref() {
                match PollAction::for_error(code) {
                    PollAction::Continue => debug!("authorization pending"),
                    PollAction::SlowDown => {
                        interval += SLOW_DOWN_INCREMENT;
                        debug!(interval_secs = interval.as_secs(), "token endpoint asked to slow down");
                    }
                    PollAction::Fail => return Err(auth_error(reply)),
                }
                continue;
            }

            let token = self.store(reply, &scope).await?;
            info!(expires_on = %token.expires_on, "device code login completed");
            return Ok(token);
        }
    }

    fn endpoint(&self, leaf: &str) -> Result<Url> {
        let mut url = self.authority.clone();
        url.path_segments_mut()
            .map_err(|_| ArmError::InvalidConfig("authority host cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend([self.tenant_id.as_str(), "oauth2", "v2.0", leaf]);
        Ok(url)
    }

    async fn store(&self, reply: TokenEndpointResponse, scope: &str) -> Result<AccessToken> {
        let token = reply.access_token.ok_or_else(|| ArmError::Auth {
            code: "invalid_response".to_string(),
            description: "token endpoint returned no access_token".to_string(),
        })?;
        let access = AccessToken {
            token,
            expires_on: Utc::now() + ChronoDuration::seconds(reply.expires_in.unwrap_or(3600) as i64),
        };

        let mut cache = self.cache.write().await;
        let refresh_token = reply
            .refresh_token
            .or_else(|| cache.as_ref().and_then(|c| c.refresh_token.clone()));
        *cache = Some(CachedToken {
            access: access.clone(),
            refresh_token,
            scope: scope.to_string(),
        });
        Ok(access)
    }

    async fn refresh(&self, refresh_token: &str, scope: &str) -> Result<AccessToken> {
        debug!("redeeming refresh token");
        let reply: TokenEndpointResponse = self
            .http
            .post(self.endpoint("token")?)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", scope),
            ])
            .send()
            .await?
            .json()
            .await?;

        if reply.error.is_some() {
            return Err(auth_error(reply));
        }
        self.store(reply, scope).await
    }
}

#[async_trait]
impl TokenCredential for DeviceCodeCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let requested = if scopes.is_empty() {
            ARM_SCOPE.to_string()
        } else {
            scopes.join(" ")
        };

        let refresh_token = {
            let cache = self.cache.read().await;
            let cached = cache.as_ref().ok_or(ArmError::NotAuthenticated)?;
            if cached.scope.starts_with(&requested) && cached.access.usable_at(Utc::now()) {
                return Ok(cached.access.clone());
            }
            cached.refresh_token.clone()
        };

        match refresh_token {
            Some(refresh_token) => {
                self.refresh(&refresh_token, &format!("{requested} offline_access"))
                    .await
            }
            None => Err(ArmError::NotAuthenticated),
        }
    }
}

fn auth_error(reply: TokenEndpointResponse) -> ArmError {
    ArmError::Auth {
        code: reply.error.unwrap_or_else(|| "unknown_error".to_string()),
        description: reply.error_description.unwrap_or_default(),
    }
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ArmError::InvalidConfig(format!("invalid URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ArmError::InvalidConfig(format!(
            "URL {raw:?} must be an absolute http(s) URL"
        )));
    }
    Ok(url)
}
