//! Node operations for MockClusterClient

use super::MockClusterClient;
use super::helpers::{check_available, check_node_lookups, check_resource_version, lock};
use crate::client::matching_nodes;
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Node, NodeSpec, Taint};
use kube::ResourceExt;

pub(crate) fn get_node(client: &MockClusterClient, name: &str) -> Result<Node, ClusterError> {
    check_node_lookups(client)?;
    lock(&client.nodes)
        .get(name)
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("Node {name} not found")))
}

pub(crate) fn list_nodes_by_provider_id(client: &MockClusterClient, provider_id: &str) -> Result<Vec<Node>, ClusterError> {
    check_node_lookups(client)?;
    Ok(matching_nodes(lock(&client.nodes).values(), provider_id))
}

pub(crate) fn patch_node_taints(client: &MockClusterClient, node: &Node, taints: &[Taint]) -> Result<Node, ClusterError> {
    check_available(client)?;
    let name = node.name_any();
    let mut nodes = lock(&client.nodes);
    {
        let mut faults = lock(&client.faults);
        if faults.node_deleted_before_patch {
            faults.node_deleted_before_patch = false;
            nodes.remove(&name);
        }
    }
    let stored = nodes
        .get_mut(&name)
        .ok_or_else(|| ClusterError::NotFound(format!("Node {name} not found")))?;

    {
        let mut faults = lock(&client.faults);
        if faults.node_conflicts > 0 {
            faults.node_conflicts -= 1;
            stored.metadata.resource_version = Some(client.next_resource_version());
        }
    }

    check_resource_version(
        "Node",
        &name,
        node.metadata.resource_version.as_deref(),
        stored.metadata.resource_version.as_deref(),
    )?;

    stored.spec.get_or_insert_with(NodeSpec::default).taints = Some(taints.to_vec());
    stored.metadata.resource_version = Some(client.next_resource_version());
    lock(&client.counters).node_taint_patches += 1;
    Ok(stored.clone())
}

pub(crate) fn patch_node_label(client: &MockClusterClient, name: &str, key: &str, value: &str) -> Result<Node, ClusterError> {
    check_available(client)?;
    let mut nodes = lock(&client.nodes);
    let stored = nodes
        .get_mut(name)
        .ok_or_else(|| ClusterError::NotFound(format!("Node {name} not found")))?;

    stored.labels_mut().insert(key.to_string(), value.to_string());
    stored.metadata.resource_version = Some(client.next_resource_version());
    lock(&client.counters).node_label_patches += 1;
    Ok(stored.clone())
}
