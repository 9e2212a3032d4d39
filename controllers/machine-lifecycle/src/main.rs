//! Machine Lifecycle Controller
//!
//! Drives `Machine` resources through their lifecycle conditions:
//! - Launched: the cloud provider reported an instance
//! - Registered: a Node with the Machine's provider ID joined the cluster
//! - Initialized: the Node is Ready, has registered every requested
//!   resource, and no startup taints remain
//!
//! Configuration is read from environment variables (see `config.rs`).

mod backoff;
mod clock;
mod config;
mod controller;
mod error;
mod reconcile_helpers;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Machine Lifecycle Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Registration requeue: {:?}", config.lifecycle.registration_requeue);
    info!("  Initialization requeue: {:?}", config.lifecycle.initialization_requeue);
    info!("  Conflict requeue: {:?} after {} retries", config.lifecycle.conflict_requeue, config.lifecycle.max_conflict_retries);
    info!("  Error backoff: {}s..{}s", config.error_backoff_min_seconds, config.error_backoff_max_seconds);
    info!("  Concurrency: {}", config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
