//! Wires the core collaborators together and runs the registry until the
//! process is asked to stop.

use crate::error::GatewayError;

use gateway_core::config::GatewayConfig;
use gateway_core::notify::{Broadcaster, PusherBroadcaster};
use gateway_core::protocol::bridge::BridgeConnector;
use gateway_core::qr::PngDataUrlRenderer;
use gateway_core::{InstanceDeps, Registry};

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use reqwest::Client;

/// Timeout for push-channel trigger requests.
const BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the shared instance collaborators from a loaded config.
///
/// # Errors
///
/// Fails when no bridge url is configured, or when an HTTP client or the
/// push channel cannot be set up.
pub fn build_deps(config: GatewayConfig) -> Result<InstanceDeps, GatewayError> {
    let connector = BridgeConnector::from_config(&config.bridge)?;

    let broadcaster = match config.pusher() {
        Some(pusher) => {
            let http = Client::builder()
                .timeout(BROADCAST_TIMEOUT)
                .build()
                .map_err(|e| GatewayError::gateway(format!("Failed to build HTTP client: {e}")))?;
            let broadcaster: Arc<dyn Broadcaster> =
                Arc::new(PusherBroadcaster::new(pusher, http)?);
            Some(broadcaster)
        }
        None => None,
    };

    Ok(InstanceDeps::new(
        config,
        Arc::new(connector),
        Arc::new(PngDataUrlRenderer::default()),
        broadcaster,
    )?)
}

/// Restores persisted instances, then waits for Ctrl-C and shuts down.
pub async fn run(config: GatewayConfig) -> Result<(), GatewayError> {
    let registry = Registry::new(build_deps(config)?);

    let restored = registry.restore().await?;
    info!("Gateway started with {restored} restored instance(s)");

    let signal = tokio::signal::ctrl_c().await;
    registry.shutdown().await;

    signal.map_err(|e| {
        error!("Failed to listen for shutdown signal: {e}");
        GatewayError::gateway(format!("Failed to listen for shutdown signal: {e}"))
    })
}
