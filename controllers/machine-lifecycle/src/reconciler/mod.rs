//! Lifecycle reconciliation for Machines.
//!
//! A pass loads one Machine and runs an ordered chain of sub-reconcilers
//! against a working copy of its status:
//! - `launch`: owns `Launched`, observes the provider identity
//! - `registration`: owns `Registered`, binds the Machine to its Node
//! - `taints`: applies startup taints to a newly bound Node
//! - `initialization`: owns `Initialized` and the Node's initialized label
//!
//! Each step has a gate evaluated against the working copy, so a condition
//! set earlier in the pass opens later gates in the same pass. After the
//! chain the dependency order `Launched`, `Registered`, `Initialized` is
//! enforced, along with `Registered` requiring a Node reference, and the
//! status is written at most once.

pub mod initialization;
pub mod launch;
pub mod registration;
pub mod resources;
pub mod taints;


use crate::clock::Clock;
use crate::config::LifecycleConfig;
use crate::error::ControllerError;
use crate::reconcile_helpers::status_needs_update;
use chrono::{DateTime, Utc};
use cluster_client::ClusterClientTrait;
use crds::{Condition, ConditionSet, ConditionStatus, ConditionType, Machine, MachineStatus};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reason recorded on conditions no step has evaluated yet.
pub const AWAITING_RECONCILIATION: &str = "AwaitingReconciliation";

/// What the dispatcher should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Nothing pending; wait for the next watch event
    Done,
    /// Run again after the delay
    RequeueAfter(Duration),
}

/// New status for the condition a step owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionDelta {
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// Result of one sub-reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub condition: Option<ConditionDelta>,
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    /// No condition change and no requeue.
    pub fn none() -> Self {
        Self::default()
    }

    /// Report a new status for the owned condition.
    pub fn condition(status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition: Some(ConditionDelta {
                status,
                reason: reason.into(),
                message: message.into(),
            }),
            requeue_after: None,
        }
    }

    /// Ask for another pass after `delay`.
    #[must_use]
    pub fn requeue_after(mut self, delay: Duration) -> Self {
        self.requeue_after = Some(delay);
        self
    }
}

/// State shared by the steps of a single pass.
pub struct PassContext<'a> {
    pub client: &'a dyn ClusterClientTrait,
    pub config: &'a LifecycleConfig,
    pub now: DateTime<Utc>,
    /// The Machine as read at the start of the pass
    pub machine: &'a Machine,
    /// Working copy of the status, written once after the chain
    pub status: MachineStatus,
    /// Node bound during this pass
    pub node: Option<Node>,
    /// True when this pass bound a Node the stored status did not reference
    pub newly_bound: bool,
}

impl<'a> PassContext<'a> {
    fn new(client: &'a dyn ClusterClientTrait, config: &'a LifecycleConfig, now: DateTime<Utc>, machine: &'a Machine) -> Self {
        Self {
            client,
            config,
            now,
            machine,
            status: machine.status.clone().unwrap_or_default(),
            node: None,
            newly_bound: false,
        }
    }

    /// Machine name.
    pub fn name(&self) -> String {
        self.machine.name_any()
    }

    /// Provider identity from the working status, treating empty as unset.
    pub fn provider_id(&self) -> Option<&str> {
        self.status.provider_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether a condition is `True` in the working status.
    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.status.conditions.is_true(type_)
    }

    /// Forget the bound Node after it disappeared mid-pass.
    ///
    /// `Registered` is reset when the chain finishes.
    pub fn drop_binding(&mut self) {
        self.status.node_name = None;
        self.status.node_uid = None;
        self.node = None;
        self.newly_bound = false;
    }
}

/// One step of the lifecycle chain.
#[async_trait::async_trait]
pub trait SubReconciler: Send + Sync {
    /// Step name for logging.
    fn name(&self) -> &'static str;

    /// Condition this step is the sole writer of.
    fn owns(&self) -> Option<ConditionType>;

    /// Whether the step runs in this pass.
    fn gate(&self, pass: &PassContext<'_>) -> bool;

    /// Run the step. Errors abort the pass without a status write.
    async fn reconcile(&self, pass: &mut PassContext<'_>) -> Result<Outcome, ControllerError>;
}

/// Drives Machines through the lifecycle chain.
pub struct Reconciler {
    client: Arc<dyn ClusterClientTrait>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    chain: Vec<Box<dyn SubReconciler>>,
}

impl Reconciler {
    /// Build a reconciler with the standard chain.
    pub fn new(client: Arc<dyn ClusterClientTrait>, clock: Arc<dyn Clock>, config: LifecycleConfig) -> Self {
        Self {
            client,
            clock,
            config,
            chain: vec![
                Box::new(launch::LaunchObserver),
                Box::new(registration::RegistrationLinker),
                Box::new(taints::TaintReconciler),
                Box::new(initialization::InitializationEvaluator),
            ],
        }
    }

    /// Reconcile one Machine by name.
    ///
    /// Write conflicts restart the pass from a fresh read up to
    /// `max_conflict_retries` times, then fall back to a short requeue.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileResult, ControllerError> {
        let mut retries = 0;
        loop {
            match self.reconcile_once(name).await {
                Err(e) if e.is_conflict() => {
                    if retries >= self.config.max_conflict_retries {
                        warn!(machine = %name, retries, "Write conflicts persisted, requeueing");
                        return Ok(ReconcileResult::RequeueAfter(self.config.conflict_requeue));
                    }
                    retries += 1;
                    debug!(machine = %name, retries, error = %e, "Write conflict, restarting pass");
                }
                result => return result,
            }
        }
    }

    async fn reconcile_once(&self, name: &str) -> Result<ReconcileResult, ControllerError> {
        let machine = match self.client.get_machine(name).await {
            Ok(machine) => machine,
            Err(e) if e.is_not_found() => {
                debug!(machine = %name, "Machine no longer exists");
                return Ok(ReconcileResult::Done);
            }
            Err(e) => return Err(e.into()),
        };
        if machine.metadata.deletion_timestamp.is_some() {
            debug!(machine = %name, "Machine is terminating, skipping");
            return Ok(ReconcileResult::Done);
        }

        let now = self.clock.now();
        let mut pass = PassContext::new(self.client.as_ref(), &self.config, now, &machine);
        pass.status.conditions.initialize(&ConditionType::ALL, AWAITING_RECONCILIATION, now);

        let mut requeue = None;
        for step in &self.chain {
            if !step.gate(&pass) {
                debug!(machine = %name, step = step.name(), "Gate closed, skipping");
                continue;
            }
            let outcome = step.reconcile(&mut pass).await?;
            if let (Some(type_), Some(delta)) = (step.owns(), outcome.condition) {
                pass.status
                    .conditions
                    .set(Condition::new(type_, delta.status, delta.reason, delta.message, now));
            }
            requeue = merge_requeue(requeue, outcome.requeue_after);
        }
        enforce_binding(&mut pass.status, now);
        enforce_dependency_chain(&mut pass.status.conditions, now);

        let previous = machine.status.as_ref();
        if status_needs_update(previous, &pass.status) {
            log_transitions(name, previous.map(|s| &s.conditions), &pass.status.conditions);
            self.client.update_machine_status(&machine, &pass.status).await?;
        } else {
            debug!(machine = %name, "Status unchanged");
        }

        Ok(requeue.map_or(ReconcileResult::Done, ReconcileResult::RequeueAfter))
    }
}

/// The earliest requested requeue wins.
fn merge_requeue(current: Option<Duration>, next: Option<Duration>) -> Option<Duration> {
    match (current, next) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// `Registered=True` requires a Node reference.
pub(crate) fn enforce_binding(status: &mut MachineStatus, now: DateTime<Utc>) -> bool {
    if status.node_name.is_some() || !status.conditions.is_true(ConditionType::Registered) {
        return false;
    }
    status.conditions.set(Condition::new(
        ConditionType::Registered,
        ConditionStatus::False,
        registration::NODE_NOT_FOUND,
        "bound Node disappeared",
        now,
    ))
}

/// Reset every condition whose predecessor is not `True` to `Unknown`.
///
/// Walks in dependency order so a reset cascades down the chain.
pub(crate) fn enforce_dependency_chain(conditions: &mut ConditionSet, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for type_ in ConditionType::ALL {
        let Some(predecessor) = type_.predecessor() else {
            continue;
        };
        if !conditions.is_true(predecessor) {
            changed |= conditions.set(Condition::new(
                type_,
                ConditionStatus::Unknown,
                format!("{predecessor}NotTrue"),
                format!("{predecessor} is not True"),
                now,
            ));
        }
    }
    changed
}

fn log_transitions(name: &str, previous: Option<&ConditionSet>, current: &ConditionSet) {
    for condition in current.iter() {
        let before = previous.map_or(ConditionStatus::Unknown, |p| p.status(condition.type_));
        if before != condition.status {
            info!(
                machine = %name,
                condition = %condition.type_,
                from = %before,
                to = %condition.status,
                reason = %condition.reason,
                "Condition transitioned"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixed_now;

    #[test]
    fn test_merge_requeue_takes_minimum() {
        let five = Duration::from_secs(5);
        let one = Duration::from_secs(1);
        assert_eq!(merge_requeue(None, None), None);
        assert_eq!(merge_requeue(Some(five), None), Some(five));
        assert_eq!(merge_requeue(None, Some(one)), Some(one));
        assert_eq!(merge_requeue(Some(five), Some(one)), Some(one));
    }

    #[test]
    fn test_enforce_dependency_chain_cascades() {
        let now = fixed_now();
        let mut conditions = ConditionSet::new();
        conditions.set(Condition::new(ConditionType::Launched, ConditionStatus::True, "Launched", "", now));
        conditions.set(Condition::new(ConditionType::Registered, ConditionStatus::False, "NodeNotFound", "", now));
        conditions.set(Condition::new(ConditionType::Initialized, ConditionStatus::True, "Initialized", "", now));

        assert!(enforce_dependency_chain(&mut conditions, now));
        let initialized = conditions.get(ConditionType::Initialized).unwrap();
        assert_eq!(initialized.status, ConditionStatus::Unknown);
        assert_eq!(initialized.reason, "RegisteredNotTrue");
        assert_eq!(conditions.status(ConditionType::Registered), ConditionStatus::False);
    }

    #[test]
    fn test_enforce_binding_requires_node_reference() {
        let now = fixed_now();
        let mut status = MachineStatus::default();
        status.conditions.set(Condition::new(ConditionType::Registered, ConditionStatus::True, "Registered", "", now));
        assert!(enforce_binding(&mut status, now));
        assert_eq!(status.conditions.status(ConditionType::Registered), ConditionStatus::False);

        status.node_name = Some("node-a".to_string());
        status.conditions.set(Condition::new(ConditionType::Registered, ConditionStatus::True, "Registered", "", now));
        assert!(!enforce_binding(&mut status, now));
    }

    #[test]
    fn test_enforce_dependency_chain_keeps_consistent_set() {
        let now = fixed_now();
        let mut conditions = ConditionSet::new();
        for type_ in ConditionType::ALL {
            conditions.set(Condition::new(type_, ConditionStatus::True, type_.as_str(), "", now));
        }
        assert!(!enforce_dependency_chain(&mut conditions, now));
    }
}
