// Shared request/response types and the error taxonomy for the snapshot gateway

use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or missing caller input.
    #[error("{0}")]
    Validation(String),

    #[error("Not logged in to Azure")]
    AuthenticationRequired,

    #[error("{0}")]
    NotFound(String),

    /// Any failure reported by the identity provider or the compute control plane.
    #[error("{0}")]
    Upstream(String),
}

impl GatewayError {
    /// HTTP status code this error is surfaced with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::AuthenticationRequired => 401,
            GatewayError::NotFound(_) => 404,
            GatewayError::Upstream(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

// Request bodies. Missing fields decode as empty strings and are forwarded as-is.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSnapshotRequest {
    pub resource_group_name: String,
    pub snapshot_name: String,
    pub disk_id: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteSnapshotRequest {
    pub resource_group_name: String,
    pub snapshot_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSnapshotQuery {
    pub resource_group_name: Option<String>,
    pub snapshot_name: Option<String>,
}

impl ValidateSnapshotQuery {
    /// Returns `(resource_group_name, snapshot_name)` when both are present and non-empty.
    pub fn require(self) -> Result<(String, String)> {
        match (self.resource_group_name, self.snapshot_name) {
            (Some(rg), Some(name)) if !rg.is_empty() && !name.is_empty() => Ok((rg, name)),
            _ => Err(GatewayError::Validation(
                "resourceGroupName and snapshotName are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotsByAgeQuery {
    pub days: Option<String>,
}

impl SnapshotsByAgeQuery {
    pub fn days(&self) -> Result<i64> {
        self.days
            .as_deref()
            .and_then(|d| d.parse::<i64>().ok())
            .ok_or_else(|| GatewayError::Validation("Invalid 'days' parameter".to_string()))
    }
}

// Response bodies

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

/// Read-only projection of a listed snapshot.
///
/// `resource_group` is serialized as `resourceGroup` but holds the snapshot's
/// full ARM resource identifier, not the resource group name. Existing callers
/// depend on that content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub name: String,
    pub resource_group: String,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotsByAgeResponse {
    pub snapshots: Vec<SnapshotSummary>,
}
