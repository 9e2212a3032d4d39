//! Initialization evaluator.
//!
//! A registered Machine is initialized once its Node is Ready, reports every
//! requested resource in both capacity and allocatable, and carries none of
//! the declared startup taints. Checks run in that order, after request
//! validation, and the first failure becomes the condition reason.
//!
//! `Initialized=True` is sticky while the binding is unchanged: later passes
//! only make sure the Node still carries the initialized label.

use super::resources::{compare, validate_requests};
use super::taints::remaining_startup_taints;
use super::{Outcome, PassContext, SubReconciler};
use crate::error::ControllerError;
use crate::reconcile_helpers::{is_node_ready, node_allocatable, node_capacity, node_label, node_taints};
use cluster_client::ClusterError;
use crds::{ConditionStatus, ConditionType, NODE_INITIALIZED_LABEL};
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub const MALFORMED_RESOURCE_REQUESTS: &str = "MalformedResourceRequests";
pub const NODE_NOT_READY: &str = "NodeNotReady";
pub const RESOURCES_NOT_REGISTERED: &str = "ResourcesNotRegistered";
pub const STARTUP_TAINTS_EXIST: &str = "StartupTaintsExist";

pub struct InitializationEvaluator;

#[async_trait::async_trait]
impl SubReconciler for InitializationEvaluator {
    fn name(&self) -> &'static str {
        "initialization"
    }

    fn owns(&self) -> Option<ConditionType> {
        Some(ConditionType::Initialized)
    }

    fn gate(&self, pass: &PassContext<'_>) -> bool {
        pass.is_true(ConditionType::Registered)
    }

    async fn reconcile(&self, pass: &mut PassContext<'_>) -> Result<Outcome, ControllerError> {
        let Some(node) = pass.node.as_ref() else {
            return Ok(Outcome::none());
        };

        if pass.is_true(ConditionType::Initialized) && !pass.newly_bound {
            if ensure_initialized_label(pass).await? {
                return Ok(Outcome::none());
            }
            return Ok(Outcome::none().requeue_after(pass.config.registration_requeue));
        }

        let machine = pass.machine;
        let requests = &machine.spec.resources.requests;
        if let Err(invalid) = validate_requests(requests) {
            warn!(machine = %pass.name(), resources = ?invalid, "Machine has malformed resource requests");
            return Ok(Outcome::condition(
                ConditionStatus::False,
                MALFORMED_RESOURCE_REQUESTS,
                format!("invalid resource requests: {}", invalid.join(", ")),
            ));
        }

        let requeue = pass.config.initialization_requeue;
        let node_name = node.name_any();

        if !is_node_ready(node) {
            debug!(machine = %pass.name(), node = %node_name, "Node not ready");
            return Ok(Outcome::condition(
                ConditionStatus::False,
                NODE_NOT_READY,
                format!("Node {node_name} is not ready"),
            )
            .requeue_after(requeue));
        }

        let missing: BTreeSet<String> = compare(requests, &node_capacity(node))
            .missing
            .into_iter()
            .chain(compare(requests, &node_allocatable(node)).missing)
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.into_iter().collect();
            debug!(machine = %pass.name(), node = %node_name, resources = ?names, "Resources not registered");
            return Ok(Outcome::condition(
                ConditionStatus::False,
                RESOURCES_NOT_REGISTERED,
                format!("resources not registered on Node {node_name}: {}", names.join(", ")),
            )
            .requeue_after(requeue));
        }

        let remaining = remaining_startup_taints(machine.startup_taints(), node_taints(node));
        if !remaining.is_empty() {
            let keys: Vec<&str> = remaining.iter().map(|t| t.key.as_str()).collect();
            debug!(machine = %pass.name(), node = %node_name, taints = ?keys, "Startup taints remain");
            return Ok(Outcome::condition(
                ConditionStatus::False,
                STARTUP_TAINTS_EXIST,
                format!("startup taints still present on Node {node_name}: {}", keys.join(", ")),
            )
            .requeue_after(requeue));
        }

        if !ensure_initialized_label(pass).await? {
            return Ok(Outcome::none().requeue_after(pass.config.registration_requeue));
        }
        info!(machine = %pass.name(), node = %node_name, "Machine initialized");
        Ok(Outcome::condition(ConditionStatus::True, "Initialized", ""))
    }
}

/// Label the bound Node as initialized unless it already is.
///
/// Returns `false`, with the binding dropped, when the Node disappeared
/// before it could be labelled.
async fn ensure_initialized_label(pass: &mut PassContext<'_>) -> Result<bool, ControllerError> {
    let Some(node) = pass.node.as_ref() else {
        return Ok(false);
    };
    if node_label(node, NODE_INITIALIZED_LABEL) == Some("true") {
        return Ok(true);
    }

    let client = pass.client;
    let node_name = node.name_any();
    match client.patch_node_label(&node_name, NODE_INITIALIZED_LABEL, "true").await {
        Ok(updated) => {
            debug!(machine = %pass.name(), node = %node_name, "Labelled Node initialized");
            pass.node = Some(updated);
            Ok(true)
        }
        Err(ClusterError::NotFound(_)) => {
            info!(machine = %pass.name(), node = %node_name, "Node vanished before labelling, dropping reference");
            pass.drop_binding();
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
