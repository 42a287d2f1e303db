use reqwest::Response;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("Authentication failed: {code}: {description}")]
    Auth { code: String, description: String },
    #[error("Device code expired before login completed")]
    DeviceCodeExpired,
    #[error("No access token available, login required")]
    NotAuthenticated,
    #[error("Request failed with status {status}: {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Operation finished with status {status}: {message}")]
    OperationFailed { status: String, message: String },
}

impl ArmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArmError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, ArmError>;

/// ARM error envelope: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub(crate) error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

/// Passes 2xx responses through and turns everything else into [`ArmError::Api`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| ErrorDetail {
            code: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .replace(' ', ""),
            message: body,
        });

    Err(ArmError::Api {
        status: status.as_u16(),
        code: detail.code,
        message: detail.message,
    })
}
