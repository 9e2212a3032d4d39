//! Test utilities for unit testing reconcilers
//!
//! Builders for Machines and Nodes plus a reconciler wired to the in-memory
//! cluster mock and a fixed clock.

use crate::clock::Clock;
use crate::config::LifecycleConfig;
use crate::reconciler::Reconciler;
use chrono::{DateTime, TimeZone, Utc};
use cluster_client::MockClusterClient;
use crds::*;
use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeSpec, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as NodeQuantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Timestamp every test pass runs at
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Clock pinned to `fixed_now()`
pub struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        fixed_now()
    }
}

/// Reconciler over the given mock with default requeue settings
pub fn test_reconciler(client: MockClusterClient) -> Reconciler {
    test_reconciler_with_config(client, LifecycleConfig::default())
}

/// Reconciler over the given mock with custom requeue settings
pub fn test_reconciler_with_config(client: MockClusterClient, config: LifecycleConfig) -> Reconciler {
    Reconciler::new(Arc::new(client), Arc::new(FixedClock), config)
}

/// Resource list from `(name, quantity)` pairs
pub fn resources(entries: &[(&str, &str)]) -> ResourceList {
    entries
        .iter()
        .map(|(name, quantity)| ((*name).to_string(), Quantity::from(*quantity)))
        .collect()
}

/// A `NoSchedule` startup taint without a value
pub fn startup_taint(key: &str) -> Taint {
    Taint {
        key: key.to_string(),
        value: None,
        effect: TaintEffect::NoSchedule,
    }
}

/// Helper to create a test Machine; `provider_id` of `None` means not yet launched
pub fn test_machine(name: &str, provider_id: Option<&str>, requests: &[(&str, &str)], startup_taints: &[Taint]) -> Machine {
    let mut labels = BTreeMap::new();
    labels.insert(PROVISIONER_NAME_LABEL.to_string(), "default".to_string());
    Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: MachineSpec {
            resources: ResourceRequirements {
                requests: resources(requests),
            },
            startup_taints: startup_taints.to_vec(),
            ..Default::default()
        },
        status: Some(MachineStatus {
            provider_id: provider_id.map(str::to_string),
            ..Default::default()
        }),
    }
}

/// Observed Node state for `test_node`
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub provider_id: String,
    /// `None` leaves the Ready condition out entirely
    pub ready: Option<bool>,
    pub capacity: ResourceList,
    pub allocatable: ResourceList,
    pub taints: Vec<Taint>,
}

impl NodeOptions {
    /// A Ready Node with no resources or taints
    pub fn ready(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            ready: Some(true),
            capacity: ResourceList::new(),
            allocatable: ResourceList::new(),
            taints: Vec::new(),
        }
    }
}

/// Helper to create a test Node; its UID is `<name>-uid`
pub fn test_node(name: &str, options: NodeOptions) -> Node {
    let to_node_resources = |list: &ResourceList| {
        list.iter()
            .map(|(name, quantity)| (name.clone(), NodeQuantity::from(quantity)))
            .collect::<BTreeMap<_, _>>()
    };
    let conditions = options.ready.map(|ready| {
        vec![NodeCondition {
            type_: NODE_READY_CONDITION.to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            ..Default::default()
        }]
    });
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(format!("{name}-uid")),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(options.provider_id.clone()),
            taints: if options.taints.is_empty() {
                None
            } else {
                Some(options.taints.iter().map(Taint::to_node_taint).collect())
            },
            ..Default::default()
        }),
        status: Some(NodeStatus {
            capacity: Some(to_node_resources(&options.capacity)),
            allocatable: Some(to_node_resources(&options.allocatable)),
            conditions,
            ..Default::default()
        }),
    }
}

/// Requests, capacity and allocatable for the standard fully-resourced scenario
pub fn standard_requests() -> Vec<(&'static str, &'static str)> {
    vec![("cpu", "2"), ("memory", "50Mi"), ("pods", "5")]
}

/// Ready Node with capacity {cpu:10, memory:100Mi, pods:110} and allocatable {cpu:8, memory:80Mi, pods:110}
pub fn standard_node_options(provider_id: &str) -> NodeOptions {
    NodeOptions {
        capacity: resources(&[("cpu", "10"), ("memory", "100Mi"), ("pods", "110")]),
        allocatable: resources(&[("cpu", "8"), ("memory", "80Mi"), ("pods", "110")]),
        ..NodeOptions::ready(provider_id)
    }
}

/// Stored condition of a Machine in the mock
pub fn stored_condition(client: &MockClusterClient, machine: &str, type_: ConditionType) -> Option<Condition> {
    client
        .machine(machine)
        .and_then(|m| m.status)
        .and_then(|s| s.conditions.get(type_).cloned())
}

/// Stored condition status, `Unknown` when absent
pub fn condition_status(client: &MockClusterClient, machine: &str, type_: ConditionType) -> ConditionStatus {
    stored_condition(client, machine, type_).map_or(ConditionStatus::Unknown, |c| c.status)
}

/// Stored condition reason, empty when absent
pub fn condition_reason(client: &MockClusterClient, machine: &str, type_: ConditionType) -> String {
    stored_condition(client, machine, type_).map(|c| c.reason).unwrap_or_default()
}

/// Assert the stored conditions respect `Initialized => Registered => Launched`
pub fn assert_dependency_chain(client: &MockClusterClient, machine: &str) {
    for type_ in ConditionType::ALL {
        if let Some(predecessor) = type_.predecessor() {
            if condition_status(client, machine, type_) == ConditionStatus::True {
                assert_eq!(
                    condition_status(client, machine, predecessor),
                    ConditionStatus::True,
                    "{type_} is True but {predecessor} is not"
                );
            }
        }
    }
}
