//! Controller-specific error types.
//!
//! This module defines error types for the machine lifecycle controller that
//! are not covered by the cluster client's own errors.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the machine lifecycle controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes client construction error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cluster state violates a binding invariant (e.g., two Nodes share a providerID)
    #[error("Malformed cluster state: {0}")]
    MalformedState(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// True when a write lost an optimistic-concurrency race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Cluster(e) if e.is_conflict())
    }
}
