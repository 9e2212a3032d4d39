//! Kubernetes-backed cluster client
//!
//! Provider-ID lookups read from a Node reflector store when one is attached,
//! and otherwise fall back to a list served from the API server's watch cache.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{Machine, MachineStatus};
use k8s_openapi::api::core::v1::{Node, Taint};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::reflector::Store;
use kube::{Client, Resource, ResourceExt};
use serde_json::{Value, json};
use tracing::debug;

/// Cluster client backed by the Kubernetes API
///
/// Machines are cluster scoped, as are Nodes, so both APIs are `Api::all`.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    node_cache: Option<Store<Node>>,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("node_cache", &self.node_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Wrap an existing Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            node_cache: None,
        }
    }

    /// Serve provider-ID lookups from a Node reflector store.
    ///
    /// The caller drives the reflector; lookups wait until its first list completes.
    #[must_use]
    pub fn with_node_cache(mut self, store: Store<Node>) -> Self {
        self.node_cache = Some(store);
        self
    }

    fn machines(&self) -> Api<Machine> {
        Api::all(self.client.clone())
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for ClusterClient {
    async fn get_machine(&self, name: &str) -> Result<Machine, ClusterError> {
        Ok(self.machines().get(name).await?)
    }

    async fn update_machine_status(&self, current: &Machine, status: &MachineStatus) -> Result<Machine, ClusterError> {
        let name = current.name_any();
        let patch = status_patch(current, status)?;
        debug!(machine = %name, "Patching Machine status");
        Ok(self
            .machines()
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        Ok(self.nodes().get(name).await?)
    }

    async fn list_nodes_by_provider_id(&self, provider_id: &str) -> Result<Vec<Node>, ClusterError> {
        if let Some(store) = &self.node_cache {
            store
                .wait_until_ready()
                .await
                .map_err(|e| ClusterError::Unavailable(format!("Node cache is not running: {e}")))?;
            let nodes = store.state();
            return Ok(matching_nodes(nodes.iter().map(|node| &**node), provider_id));
        }

        // Node providerID is not a supported field selector
        let nodes = self.nodes().list(&ListParams::default().match_any()).await?;
        Ok(matching_nodes(&nodes.items, provider_id))
    }

    async fn patch_node_taints(&self, node: &Node, taints: &[Taint]) -> Result<Node, ClusterError> {
        let name = node.name_any();
        let patch = json!({
            "metadata": { "resourceVersion": required_resource_version(node)? },
            "spec": { "taints": taints },
        });
        debug!(node = %name, taints = taints.len(), "Patching Node taints");
        Ok(self
            .nodes()
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn patch_node_label(&self, name: &str, key: &str, value: &str) -> Result<Node, ClusterError> {
        let patch = json!({ "metadata": { "labels": { key: value } } });
        debug!(node = %name, label = %key, "Patching Node label");
        Ok(self
            .nodes()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}

/// Nodes reporting `provider_id`, sorted by name.
pub fn matching_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>, provider_id: &str) -> Vec<Node> {
    let mut matching: Vec<Node> = nodes
        .into_iter()
        .filter(|node| {
            node.spec
                .as_ref()
                .and_then(|spec| spec.provider_id.as_deref())
                == Some(provider_id)
        })
        .cloned()
        .collect();
    matching.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    matching
}

fn required_resource_version<K: Resource>(object: &K) -> Result<String, ClusterError> {
    object.meta().resource_version.clone().ok_or_else(|| {
        ClusterError::InvalidRequest(format!(
            "{} has no resourceVersion",
            object.meta().name.as_deref().unwrap_or("<unnamed>")
        ))
    })
}

/// Builds the merge patch that replaces a Machine status.
///
/// Merge patches only remove what they explicitly null, so fields and
/// resource-list keys present in the current status but absent from the new
/// one are sent as `null`. The patch carries the current `resourceVersion`.
pub fn status_patch(current: &Machine, status: &MachineStatus) -> Result<Value, ClusterError> {
    let mut body = serde_json::to_value(status)?;
    if let (Some(previous), Value::Object(fields)) = (current.status.as_ref(), &mut body) {
        if let Value::Object(previous) = serde_json::to_value(previous)? {
            for (key, old) in previous {
                match fields.get_mut(&key) {
                    None => {
                        fields.insert(key, Value::Null);
                    }
                    Some(Value::Object(new_map)) => {
                        if let Value::Object(old_map) = old {
                            for (old_key, _) in old_map {
                                new_map.entry(old_key).or_insert(Value::Null);
                            }
                        }
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(json!({
        "metadata": { "resourceVersion": required_resource_version(current)? },
        "status": body,
    }))
}
