//! Well-known label keys and Node condition names.

/// Label on a Machine naming the provisioner that requested it.
pub const PROVISIONER_NAME_LABEL: &str = "karpenter.sh/provisioner-name";

/// Label written onto a Node once its Machine reaches `Initialized=True`.
pub const NODE_INITIALIZED_LABEL: &str = "karpenter.sh/initialized";

/// Node condition type reporting kubelet readiness.
pub const NODE_READY_CONDITION: &str = "Ready";
