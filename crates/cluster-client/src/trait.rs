//! ClusterClient trait for mocking
//!
//! The lifecycle reconciler talks to the object store only through this
//! trait. `ClusterClient` implements it against the Kubernetes API and
//! `MockClusterClient` (feature `test-util`) implements it in memory.

use crate::error::ClusterError;
use crds::{Machine, MachineStatus};
use k8s_openapi::api::core::v1::{Node, Taint};

/// Object-store operations needed by the lifecycle reconciler
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Writes carry the `resourceVersion` of the object they were computed from and
/// fail with [`ClusterError::Conflict`] when it is stale.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Fetch a Machine by name.
    async fn get_machine(&self, name: &str) -> Result<Machine, ClusterError>;

    /// Replace the status of `current` with `status`.
    async fn update_machine_status(&self, current: &Machine, status: &MachineStatus) -> Result<Machine, ClusterError>;

    /// Fetch a Node by name.
    async fn get_node(&self, name: &str) -> Result<Node, ClusterError>;

    /// All Nodes reporting the given provider identity, sorted by name.
    async fn list_nodes_by_provider_id(&self, provider_id: &str) -> Result<Vec<Node>, ClusterError>;

    /// Replace the taints of `node`.
    async fn patch_node_taints(&self, node: &Node, taints: &[Taint]) -> Result<Node, ClusterError>;

    /// Set a single label on a Node.
    async fn patch_node_label(&self, name: &str, key: &str, value: &str) -> Result<Node, ClusterError>;
}
