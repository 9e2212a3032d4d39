//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! for reconciler tests that need no running cluster.
//!
//! The mock is organized by object kind:
//! - `machines.rs` - Machine reads and status writes
//! - `nodes.rs` - Node reads, listing and patches
//! - `helpers.rs` - Locking, resource versions and fault checks
//!
//! Faults are injected per kind: Machine status conflicts, Node taint patch
//! conflicts, Node deletion racing a patch, and whole-store outages.
//!
//! Every write bumps the object's `resourceVersion`. Writes computed from a
//! stale copy fail with `ClusterError::Conflict`, as the API server does.

mod helpers;
mod machines;
mod nodes;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{Machine, MachineStatus};
use helpers::lock;
use k8s_openapi::api::core::v1::{Node, Taint};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Number of writes the mock has accepted, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounters {
    /// Accepted Machine status writes
    pub machine_status_updates: usize,
    /// Accepted Node taint patches
    pub node_taint_patches: usize,
    /// Accepted Node label patches
    pub node_label_patches: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub(crate) status_conflicts: u32,
    pub(crate) unavailable: bool,
    pub(crate) node_lookups_fail: bool,
    pub(crate) node_conflicts: u32,
    pub(crate) node_deleted_before_patch: bool,
}

/// Mock ClusterClient for testing
///
/// Clones share the same store, so a test can keep a handle while the
/// reconciler owns another.
#[derive(Debug, Clone, Default)]
pub struct MockClusterClient {
    pub(crate) machines: Arc<Mutex<HashMap<String, Machine>>>,
    pub(crate) nodes: Arc<Mutex<HashMap<String, Node>>>,
    pub(crate) next_resource_version: Arc<Mutex<u64>>,
    pub(crate) faults: Arc<Mutex<Faults>>,
    pub(crate) counters: Arc<Mutex<WriteCounters>>,
}

impl MockClusterClient {
    /// Create an empty mock store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a Machine (for test setup), returning the stored copy
    pub fn apply_machine(&self, mut machine: Machine) -> Machine {
        machine.metadata.resource_version = Some(self.next_resource_version());
        lock(&self.machines).insert(machine.name_any(), machine.clone());
        machine
    }

    /// Insert or replace a Node (for test setup), returning the stored copy
    pub fn apply_node(&self, mut node: Node) -> Node {
        node.metadata.resource_version = Some(self.next_resource_version());
        lock(&self.nodes).insert(node.name_any(), node.clone());
        node
    }

    /// Remove a Node (for test setup)
    pub fn delete_node(&self, name: &str) -> Option<Node> {
        lock(&self.nodes).remove(name)
    }

    /// Current stored Machine
    #[must_use]
    pub fn machine(&self, name: &str) -> Option<Machine> {
        lock(&self.machines).get(name).cloned()
    }

    /// Current stored Node
    #[must_use]
    pub fn node(&self, name: &str) -> Option<Node> {
        lock(&self.nodes).get(name).cloned()
    }

    /// Make the next `count` status writes lose a race with another writer
    pub fn inject_status_conflicts(&self, count: u32) {
        lock(&self.faults).status_conflicts = count;
    }

    /// Fail every operation with `ClusterError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.faults).unavailable = unavailable;
    }

    /// Fail Node reads and listings with `ClusterError::Unavailable`
    pub fn fail_node_lookups(&self, fail: bool) {
        lock(&self.faults).node_lookups_fail = fail;
    }

    /// Make the next `count` Node taint patches lose a race with another writer
    pub fn inject_node_conflicts(&self, count: u32) {
        lock(&self.faults).node_conflicts = count;
    }

    /// Delete the target Node just before the next taint patch lands
    pub fn delete_node_before_patch(&self, delete: bool) {
        lock(&self.faults).node_deleted_before_patch = delete;
    }

    /// Writes accepted so far
    #[must_use]
    pub fn counters(&self) -> WriteCounters {
        *lock(&self.counters)
    }

    pub(crate) fn next_resource_version(&self) -> String {
        let mut version = lock(&self.next_resource_version);
        *version += 1;
        version.to_string()
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_machine(&self, name: &str) -> Result<Machine, ClusterError> {
        machines::get_machine(self, name)
    }

    async fn update_machine_status(&self, current: &Machine, status: &MachineStatus) -> Result<Machine, ClusterError> {
        machines::update_machine_status(self, current, status)
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        nodes::get_node(self, name)
    }

    async fn list_nodes_by_provider_id(&self, provider_id: &str) -> Result<Vec<Node>, ClusterError> {
        nodes::list_nodes_by_provider_id(self, provider_id)
    }

    async fn patch_node_taints(&self, node: &Node, taints: &[Taint]) -> Result<Node, ClusterError> {
        nodes::patch_node_taints(self, node, taints)
    }

    async fn patch_node_label(&self, name: &str, key: &str, value: &str) -> Result<Node, ClusterError> {
        nodes::patch_node_label(self, name, key, value)
    }
}
