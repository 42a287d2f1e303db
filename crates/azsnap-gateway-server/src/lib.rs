pub mod age;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod lifecycle;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use azsnap_arm::{SnapshotsApi, TokenCredential};

use backend::{ClientFactory, IdentityProvider};
use credentials::CredentialStore;
use error::{upstream, ApiError};
use handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialStore,
    pub identity: Arc<dyn IdentityProvider>,
    pub clients: Arc<dyn ClientFactory>,
}

impl AppState {
    pub fn new(identity: Arc<dyn IdentityProvider>, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            credentials: CredentialStore::new(),
            identity,
            clients,
        }
    }

    /// Request-scoped snapshots client bound to `credential`.
    pub(crate) fn connect(
        &self,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn SnapshotsApi>, ApiError> {
        self.clients
            .snapshots_client(credential)
            .map_err(|e| upstream("Failed to create snapshots client", e))
    }
}

pub fn create_app(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/login", get(login_handler))
        .route("/create-snapshot", post(create_snapshot_handler))
        .route("/delete-snapshot", post(delete_snapshot_handler))
        .route("/validate-snapshot", get(validate_snapshot_handler))
        .route("/snapshots-by-age", get(snapshots_by_age_handler))
        .route("/health", get(health_handler))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
