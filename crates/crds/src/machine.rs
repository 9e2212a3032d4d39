//! Machine CRD
//!
//! A Machine is the cluster-side record of one compute instance requested by a
//! provisioner. The spec is fixed at creation; the status tracks the provider
//! instance, the Node it registered as, and the lifecycle conditions.

use crate::conditions::ConditionSet;
use crate::quantity::ResourceList;
use k8s_openapi::api::core::v1::Taint as NodeTaint;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "karpenter.sh",
    version = "v1alpha5",
    kind = "Machine",
    status = "MachineStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"ProviderID","type":"string","jsonPath":".status.providerID"}"#,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".status.nodeName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Resources the Machine was sized for
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Taints applied to the Node on registration and removed externally
    /// once node-local setup finishes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub startup_taints: Vec<Taint>,

    /// Regular taints for the Node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,

    /// Scheduling constraints the instance was chosen against
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Resource name to requested quantity
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub requests: ResourceList,
}

/// Node taint effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TaintEffect {
    /// Pods that do not tolerate the taint are not scheduled
    NoSchedule,
    /// Scheduler avoids the Node when possible
    PreferNoSchedule,
    /// Running pods that do not tolerate the taint are evicted
    NoExecute,
}

impl TaintEffect {
    /// Wire name of the effect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSchedule => "NoSchedule",
            Self::PreferNoSchedule => "PreferNoSchedule",
            Self::NoExecute => "NoExecute",
        }
    }
}

impl fmt::Display for TaintEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    /// Taint key
    pub key: String,

    /// Optional taint value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Taint effect
    pub effect: TaintEffect,
}

impl Taint {
    /// True when the Node taint has the same key, value and effect.
    ///
    /// An absent value and an empty value are the same taint.
    #[must_use]
    pub fn matches(&self, node_taint: &NodeTaint) -> bool {
        self.key == node_taint.key
            && self.effect.as_str() == node_taint.effect
            && self.value.as_deref().unwrap_or_default()
                == node_taint.value.as_deref().unwrap_or_default()
    }

    /// Converts to the core/v1 Node taint.
    #[must_use]
    pub fn to_node_taint(&self) -> NodeTaint {
        NodeTaint {
            key: self.key.clone(),
            value: self.value.clone(),
            effect: self.effect.as_str().to_string(),
            time_added: None,
        }
    }
}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}:{}", self.key, value, self.effect),
            None => write!(f, "{}:{}", self.key, self.effect),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    /// Label key
    pub key: String,

    /// In, NotIn, Exists, DoesNotExist, Gt or Lt
    pub operator: String,

    /// Values for the operator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Cloud provider instance identity, set once launched
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Name of the Node bound to this Machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    /// UID of the bound Node; a Node re-created under the same name is a new binding
    #[serde(rename = "nodeUID", default, skip_serializing_if = "Option::is_none")]
    pub node_uid: Option<String>,

    /// Capacity observed on the bound Node
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub capacity: ResourceList,

    /// Allocatable resources observed on the bound Node
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub allocatable: ResourceList,

    /// Lifecycle conditions
    #[serde(default, skip_serializing_if = "ConditionSet::is_empty")]
    pub conditions: ConditionSet,
}

impl Machine {
    /// Provider identity, treating an empty string as unset.
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.provider_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Declared startup taints.
    #[must_use]
    pub fn startup_taints(&self) -> &[Taint] {
        &self.spec.startup_taints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;
    use kube::core::CustomResourceExt;

    #[test]
    fn test_crd_identity() {
        let crd = Machine::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("machines.karpenter.sh"));
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(Machine::kind(&()), "Machine");
        assert_eq!(Machine::api_version(&()), "karpenter.sh/v1alpha5");
    }

    #[test]
    fn test_spec_deserializes_from_camel_case() {
        let spec: MachineSpec = serde_json::from_value(serde_json::json!({
            "resources": { "requests": { "cpu": "2", "memory": "50Mi" } },
            "startupTaints": [{ "key": "example.com/setup", "effect": "NoSchedule" }]
        }))
        .unwrap();
        assert_eq!(spec.resources.requests.len(), 2);
        assert_eq!(spec.startup_taints[0].effect, TaintEffect::NoSchedule);
        assert!(spec.taints.is_empty());
    }

    #[test]
    fn test_status_provider_id_wire_name() {
        let status = MachineStatus {
            provider_id: Some("fake://i-123".to_string()),
            ..MachineStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["providerID"], "fake://i-123");
        assert!(json.get("nodeUID").is_none());
        assert!(json.get("conditions").is_none());
    }

    #[test]
    fn test_status_with_foreign_condition_deserializes() {
        let status: MachineStatus = serde_json::from_value(serde_json::json!({
            "providerID": "fake://i-123",
            "conditions": [
                { "type": "Launched", "status": "True", "reason": "Launched", "lastTransitionTime": "2024-01-01T00:00:00Z" },
                { "type": "Drifted", "status": "True", "reason": "ImageChanged", "lastTransitionTime": "2024-01-01T00:00:00Z" }
            ]
        }))
        .unwrap();
        assert!(status.conditions.is_true(crate::ConditionType::Launched));
        assert_eq!(status.conditions.foreign().len(), 1);
    }

    #[test]
    fn test_empty_provider_id_is_unset() {
        let mut machine = Machine::new("m", MachineSpec::default());
        assert_eq!(machine.provider_id(), None);
        machine.status = Some(MachineStatus {
            provider_id: Some(String::new()),
            ..MachineStatus::default()
        });
        assert_eq!(machine.provider_id(), None);
    }

    #[test]
    fn test_taint_matching_treats_missing_value_as_empty() {
        let declared = Taint {
            key: "example.com/setup".to_string(),
            value: None,
            effect: TaintEffect::NoSchedule,
        };
        let mut node_taint = declared.to_node_taint();
        assert!(declared.matches(&node_taint));

        node_taint.value = Some(String::new());
        assert!(declared.matches(&node_taint));

        node_taint.effect = "NoExecute".to_string();
        assert!(!declared.matches(&node_taint));
    }
}
