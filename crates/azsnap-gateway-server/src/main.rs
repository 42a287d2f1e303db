use color_eyre::eyre;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use azsnap_gateway_server::{
    backend::{ArmClientFactory, DeviceCodeLogin},
    config::{GatewayConfig, SHUTDOWN_TIMEOUT},
    create_app,
    lifecycle::{shutdown_signal, Lifecycle},
    AppState,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,azsnap_gateway_server=debug")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    info!(
        port = config.port,
        origins = ?config.allowed_origins,
        "configuration loaded"
    );

    let state = AppState::new(
        Arc::new(DeviceCodeLogin::from_config(&config)),
        Arc::new(ArmClientFactory::from_config(&config)),
    );
    let app = create_app(state, &config.allowed_origins);

    let lifecycle = Lifecycle::new(SHUTDOWN_TIMEOUT);
    let listener = lifecycle.bind(config.bind_addr()).await?;
    lifecycle.serve(listener, app, shutdown_signal()).await?;

    Ok(())
}
