//! Registration linker.
//!
//! Binds a launched Machine to the Node that reports its provider identity.
//! The stored `nodeName` is tried first; if that Node is gone or now belongs
//! to another instance the reference is dropped and Nodes are listed by
//! provider identity instead.
//!
//! The binding is keyed on the Node's UID as well as its name. A Node deleted
//! and re-created under the same name is a new binding.

use super::{Outcome, PassContext, SubReconciler};
use crate::error::ControllerError;
use crate::reconcile_helpers::{node_allocatable, node_capacity, node_provider_id};
use crds::{ConditionStatus, ConditionType};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::{debug, info};

/// Reason for `Registered=False` while no Node reports the provider identity.
pub const NODE_NOT_FOUND: &str = "NodeNotFound";

pub struct RegistrationLinker;

#[async_trait::async_trait]
impl SubReconciler for RegistrationLinker {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn owns(&self) -> Option<ConditionType> {
        Some(ConditionType::Registered)
    }

    fn gate(&self, pass: &PassContext<'_>) -> bool {
        pass.is_true(ConditionType::Launched) && pass.provider_id().is_some()
    }

    async fn reconcile(&self, pass: &mut PassContext<'_>) -> Result<Outcome, ControllerError> {
        let Some(provider_id) = pass.provider_id().map(str::to_string) else {
            return Ok(Outcome::none());
        };
        let client = pass.client;
        let previous = Binding {
            name: pass.status.node_name.clone(),
            uid: pass.status.node_uid.clone(),
        };

        if let Some(node_name) = previous.name.as_deref() {
            match client.get_node(node_name).await {
                Ok(node) if node_provider_id(&node) == Some(provider_id.as_str()) => {
                    return Ok(bind(pass, node, &previous));
                }
                Ok(_) => {
                    info!(machine = %pass.name(), node = %node_name, "Bound Node reports a different provider ID, dropping reference");
                }
                Err(e) if e.is_not_found() => {
                    info!(machine = %pass.name(), node = %node_name, "Bound Node is gone, dropping reference");
                }
                Err(e) => return Err(e.into()),
            }
            pass.status.node_name = None;
            pass.status.node_uid = None;
        }

        let mut nodes = client.list_nodes_by_provider_id(&provider_id).await?;
        match nodes.len() {
            0 => {
                debug!(machine = %pass.name(), provider_id = %provider_id, "No Node registered yet");
                Ok(Outcome::condition(
                    ConditionStatus::False,
                    NODE_NOT_FOUND,
                    format!("no Node reports provider ID {provider_id}"),
                )
                .requeue_after(pass.config.registration_requeue))
            }
            1 => {
                let node = nodes.remove(0);
                Ok(bind(pass, node, &previous))
            }
            n => {
                let names: Vec<String> = nodes.iter().map(ResourceExt::name_any).collect();
                Err(ControllerError::MalformedState(format!(
                    "{n} Nodes report provider ID {provider_id}: {}",
                    names.join(", ")
                )))
            }
        }
    }
}

/// Node reference stored before this pass.
struct Binding {
    name: Option<String>,
    uid: Option<String>,
}

impl Binding {
    /// True when `node` is the Node this reference was recorded for.
    ///
    /// A reference written without a UID matches on name alone.
    fn is_same(&self, node: &Node) -> bool {
        self.name.as_deref() == node.metadata.name.as_deref()
            && self.uid.as_ref().is_none_or(|uid| node.metadata.uid.as_ref() == Some(uid))
    }
}

fn bind(pass: &mut PassContext<'_>, node: Node, previous: &Binding) -> Outcome {
    let newly_bound = !previous.is_same(&node);
    if newly_bound {
        if previous.name.as_deref() == node.metadata.name.as_deref() {
            info!(machine = %pass.name(), node = %node.name_any(), "Node was re-created, rebinding");
        } else {
            info!(machine = %pass.name(), node = %node.name_any(), "Machine registered to Node");
        }
    }
    pass.status.node_name = Some(node.name_any());
    pass.status.node_uid = node.metadata.uid.clone();
    pass.status.capacity = node_capacity(&node);
    pass.status.allocatable = node_allocatable(&node);
    pass.newly_bound = newly_bound;
    pass.node = Some(node);
    Outcome::condition(ConditionStatus::True, "Registered", "")
}
