//! Helper functions for reading observed Node state
//!
//! Small accessors shared by the sub-reconcilers and the watcher so each
//! step reads Node fields the same way.

use crds::{Machine, MachineStatus, NODE_READY_CONDITION, Quantity, ResourceList};
use k8s_openapi::api::core::v1::{Node, Taint};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as NodeQuantity;
use std::collections::BTreeMap;

/// Provider identity reported by the Node, treating an empty string as unset.
pub fn node_provider_id(node: &Node) -> Option<&str> {
    node.spec
        .as_ref()
        .and_then(|spec| spec.provider_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// True only when the Node's Ready condition is present with status `True`.
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == NODE_READY_CONDITION))
        .is_some_and(|c| c.status == "True")
}

/// Taints currently on the Node.
pub fn node_taints(node: &Node) -> &[Taint] {
    node.spec
        .as_ref()
        .and_then(|spec| spec.taints.as_deref())
        .unwrap_or_default()
}

/// Value of a Node label.
pub fn node_label<'a>(node: &'a Node, key: &str) -> Option<&'a str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

/// Capacity reported by the Node.
pub fn node_capacity(node: &Node) -> ResourceList {
    resource_list(node.status.as_ref().and_then(|s| s.capacity.as_ref()))
}

/// Allocatable resources reported by the Node.
pub fn node_allocatable(node: &Node) -> ResourceList {
    resource_list(node.status.as_ref().and_then(|s| s.allocatable.as_ref()))
}

fn resource_list(resources: Option<&BTreeMap<String, NodeQuantity>>) -> ResourceList {
    resources
        .map(|resources| {
            resources
                .iter()
                .map(|(name, quantity)| (name.clone(), Quantity::from(quantity)))
                .collect()
        })
        .unwrap_or_default()
}

/// True when a Node event concerns this Machine, by provider identity or bound name.
pub fn machine_matches_node(machine: &Machine, node: &Node) -> bool {
    let by_provider_id = machine
        .provider_id()
        .is_some_and(|id| node_provider_id(node) == Some(id));
    let by_name = machine
        .status
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .is_some_and(|name| node.metadata.name.as_deref() == Some(name));
    by_provider_id || by_name
}

/// Check if the Machine status needs to be written.
pub fn status_needs_update(previous: Option<&MachineStatus>, updated: &MachineStatus) -> bool {
    previous != Some(updated)
}
