//! Startup taints.
//!
//! Startup taints keep workloads off a Node until node-local setup finishes.
//! They are added once, on the pass that first binds the Node, and removed by
//! whatever agent performs the setup. This controller never removes them.

use super::{Outcome, PassContext, SubReconciler};
use crate::error::ControllerError;
use crate::reconcile_helpers::node_taints;
use cluster_client::ClusterError;
use crds::{ConditionType, Taint};
use k8s_openapi::api::core::v1::Taint as NodeTaint;
use kube::ResourceExt;
use tracing::{debug, info};

pub struct TaintReconciler;

#[async_trait::async_trait]
impl SubReconciler for TaintReconciler {
    fn name(&self) -> &'static str {
        "taints"
    }

    fn owns(&self) -> Option<ConditionType> {
        None
    }

    // A new binding re-opens the gate: Initialized then refers to the previous Node
    fn gate(&self, pass: &PassContext<'_>) -> bool {
        pass.is_true(ConditionType::Registered) && (!pass.is_true(ConditionType::Initialized) || pass.newly_bound)
    }

    async fn reconcile(&self, pass: &mut PassContext<'_>) -> Result<Outcome, ControllerError> {
        if !pass.newly_bound {
            return Ok(Outcome::none());
        }
        let Some(node) = pass.node.as_ref() else {
            return Ok(Outcome::none());
        };

        let machine = pass.machine;
        let missing = missing_startup_taints(machine.startup_taints(), node_taints(node));
        if missing.is_empty() {
            debug!(machine = %pass.name(), node = %node.name_any(), "Startup taints already present");
            return Ok(Outcome::none());
        }

        let keys: Vec<&str> = missing.iter().map(|t| t.key.as_str()).collect();
        let mut taints = node_taints(node).to_vec();
        taints.extend(missing.iter().map(|t| t.to_node_taint()));

        let client = pass.client;
        let updated = match client.patch_node_taints(node, &taints).await {
            Ok(updated) => updated,
            Err(ClusterError::NotFound(_)) => {
                info!(machine = %pass.name(), "Node vanished before startup taints were applied, dropping reference");
                pass.drop_binding();
                return Ok(Outcome::none().requeue_after(pass.config.registration_requeue));
            }
            Err(e) => return Err(e.into()),
        };
        info!(machine = %pass.name(), node = %updated.name_any(), taints = ?keys, "Added startup taints");
        pass.node = Some(updated);
        Ok(Outcome::none())
    }
}

/// Declared startup taints not yet on the Node, without duplicates.
pub fn missing_startup_taints<'a>(declared: &'a [Taint], present: &[NodeTaint]) -> Vec<&'a Taint> {
    let mut missing: Vec<&Taint> = Vec::new();
    for taint in declared {
        if !present.iter().any(|p| taint.matches(p)) && !missing.contains(&taint) {
            missing.push(taint);
        }
    }
    missing
}

/// Declared startup taints still on the Node.
pub fn remaining_startup_taints<'a>(declared: &'a [Taint], present: &[NodeTaint]) -> Vec<&'a Taint> {
    declared
        .iter()
        .filter(|taint| present.iter().any(|p| taint.matches(p)))
        .collect()
}

/// True when none of the declared startup taints remain; vacuously true for none declared.
pub fn is_untainted(declared: &[Taint], present: &[NodeTaint]) -> bool {
    remaining_startup_taints(declared, present).is_empty()
}
