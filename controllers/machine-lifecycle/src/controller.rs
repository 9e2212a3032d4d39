//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the cluster
//! client, its Node cache, the lifecycle reconciler and the Machine watcher
//! together.

use crate::clock::SystemClock;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::{Watcher, node_reflector};
use cluster_client::ClusterClient;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for Machine lifecycle management.
pub struct Controller {
    machine_watcher: JoinHandle<Result<(), ControllerError>>,
    node_cache: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Machine Lifecycle Controller");

        let kube_client = Client::try_default().await?;
        let (node_store, node_cache_driver) = node_reflector(Api::all(kube_client.clone()));
        let node_cache = tokio::spawn(node_cache_driver);
        let cluster_client = Arc::new(ClusterClient::new(kube_client.clone()).with_node_cache(node_store));
        let reconciler = Arc::new(Reconciler::new(
            cluster_client,
            Arc::new(SystemClock),
            config.lifecycle.clone(),
        ));

        let watcher = Watcher::new(kube_client, reconciler, &config);
        let machine_watcher = tokio::spawn(async move { watcher.watch_machines().await });

        Ok(Self {
            machine_watcher,
            node_cache,
        })
    }

    /// Runs until the watcher exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Machine Lifecycle Controller running");

        let result = self.machine_watcher.await;
        self.node_cache.abort();
        result
            .map_err(|e| ControllerError::Watch(format!("Machine watcher panicked: {}", e)))?
            .map_err(|e| ControllerError::Watch(format!("Machine watcher error: {}", e)))?;

        info!("Machine Lifecycle Controller stopped");
        Ok(())
    }
}
