use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use azsnap_common::{ErrorResponse, GatewayError};
use tracing::{error, warn};

/// Handler error rendered as `{"error": "..."}` with the matching status code.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(%status, "{}", self.0);
        } else {
            warn!(%status, "{}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Wraps an upstream failure with the step that failed.
pub(crate) fn upstream(context: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError(GatewayError::Upstream(format!("{context}: {err}")))
}
