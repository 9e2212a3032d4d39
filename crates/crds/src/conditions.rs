//! Machine lifecycle conditions
//!
//! A Machine moves through `Launched`, `Registered` and `Initialized`. Each
//! condition is tri-state and carries a machine-readable reason, a message and
//! the time its status last changed.
//!
//! Other controllers may add their own condition types to a Machine. Those
//! entries are carried through reads and writes untouched.

use chrono::{DateTime, Utc};
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Lifecycle condition types, declared in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The cloud provider has created the instance
    Launched,
    /// A Node with the Machine's provider identity exists and is bound
    Registered,
    /// The bound Node is ready, resourced and free of startup taints
    Initialized,
}

impl ConditionType {
    /// Every condition type, in dependency order.
    pub const ALL: [Self; 3] = [Self::Launched, Self::Registered, Self::Initialized];

    /// Wire name of the condition type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Launched => "Launched",
            Self::Registered => "Registered",
            Self::Initialized => "Initialized",
        }
    }

    /// The condition that must be `True` before this one may be `True`.
    #[must_use]
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Launched => None,
            Self::Registered => Some(Self::Launched),
            Self::Initialized => Some(Self::Registered),
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Open string in the schema so other controllers can write their own types
impl JsonSchema for ConditionType {
    fn schema_name() -> Cow<'static, str> {
        "ConditionType".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({ "type": "string" })
    }
}

/// Condition status following Kubernetes conventions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Not yet evaluated, or invalidated by a predecessor
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style status condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// True, False or Unknown
    pub status: ConditionStatus,

    /// Machine-readable reason for the current status
    #[serde(default)]
    pub reason: String,

    /// Human-readable detail
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition stamped with the given time
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }

    /// True when status, reason and message all match.
    fn same_state(&self, other: &Self) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// One entry of the wire list: a lifecycle condition, or any other
/// controller's condition kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireCondition {
    Known(Condition),
    Foreign(Value),
}

/// Ordered set of conditions, unique by type.
///
/// Entries are kept sorted by [`ConditionType`] so serialization is stable
/// regardless of the order in which conditions were written. Entries of
/// other types are kept as read and written back after the known ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<WireCondition>", into = "Vec<WireCondition>")]
pub struct ConditionSet {
    known: Vec<Condition>,
    foreign: Vec<Value>,
}

impl From<Vec<WireCondition>> for ConditionSet {
    fn from(entries: Vec<WireCondition>) -> Self {
        let mut set = Self::default();
        for entry in entries {
            match entry {
                WireCondition::Known(condition) => set.known.push(condition),
                // A known type that failed to parse is re-initialized instead
                WireCondition::Foreign(value) if !is_known_type(&value) => set.foreign.push(value),
                WireCondition::Foreign(_) => {}
            }
        }
        set.known.sort_by_key(|c| c.type_);
        set.known.dedup_by_key(|c| c.type_);
        set
    }
}

impl From<ConditionSet> for Vec<WireCondition> {
    fn from(set: ConditionSet) -> Self {
        set.known
            .into_iter()
            .map(WireCondition::Known)
            .chain(set.foreign.into_iter().map(WireCondition::Foreign))
            .collect()
    }
}

impl JsonSchema for ConditionSet {
    fn schema_name() -> Cow<'static, str> {
        "ConditionSet".into()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        <Vec<Condition>>::json_schema(generator)
    }
}

fn is_known_type(value: &Value) -> bool {
    let type_ = value.get("type").and_then(Value::as_str);
    ConditionType::ALL.iter().any(|t| type_ == Some(t.as_str()))
}

impl ConditionSet {
    /// Empty condition set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a condition by type.
    #[must_use]
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.known.iter().find(|c| c.type_ == type_)
    }

    /// Status of a condition; absent conditions read as `Unknown`.
    #[must_use]
    pub fn status(&self, type_: ConditionType) -> ConditionStatus {
        self.get(type_).map(|c| c.status).unwrap_or_default()
    }

    /// True when the condition is present with status `True`.
    #[must_use]
    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.status(type_) == ConditionStatus::True
    }

    /// Writes a condition, returning whether anything changed.
    ///
    /// Writing an identical status, reason and message is a no-op. The
    /// transition time only moves when the status itself changes.
    pub fn set(&mut self, condition: Condition) -> bool {
        match self.known.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.same_state(&condition) => false,
            Some(existing) => {
                let last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time
                } else {
                    condition.last_transition_time
                };
                *existing = Condition {
                    last_transition_time,
                    ..condition
                };
                true
            }
            None => {
                let index = self.known.partition_point(|c| c.type_ < condition.type_);
                self.known.insert(index, condition);
                true
            }
        }
    }

    /// Removes a condition, returning whether it was present.
    pub fn clear(&mut self, type_: ConditionType) -> bool {
        let before = self.known.len();
        self.known.retain(|c| c.type_ != type_);
        self.known.len() != before
    }

    /// Adds an `Unknown` entry for each missing type, returning whether any were added.
    pub fn initialize(&mut self, types: &[ConditionType], reason: &str, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for &type_ in types {
            if self.get(type_).is_none() {
                changed |= self.set(Condition::new(type_, ConditionStatus::Unknown, reason, "", now));
            }
        }
        changed
    }

    /// Iterates conditions in dependency order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.known.iter()
    }

    /// Entries of condition types this crate does not define.
    #[must_use]
    pub fn foreign(&self) -> &[Value] {
        &self.foreign
    }

    /// True when no conditions are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.foreign.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn condition(type_: ConditionType, status: ConditionStatus, reason: &str, now: DateTime<Utc>) -> Condition {
        Condition::new(type_, status, reason, "", now)
    }

    #[test]
    fn test_missing_condition_reads_unknown() {
        let set = ConditionSet::new();
        assert_eq!(set.status(ConditionType::Registered), ConditionStatus::Unknown);
        assert!(!set.is_true(ConditionType::Registered));
    }

    #[test]
    fn test_set_keeps_dependency_order() {
        let mut set = ConditionSet::new();
        set.set(condition(ConditionType::Initialized, ConditionStatus::False, "NodeNotReady", at(0)));
        set.set(condition(ConditionType::Launched, ConditionStatus::True, "Launched", at(0)));
        set.set(condition(ConditionType::Registered, ConditionStatus::True, "Registered", at(0)));

        let order: Vec<_> = set.iter().map(|c| c.type_).collect();
        assert_eq!(order, ConditionType::ALL.to_vec());
    }

    #[test]
    fn test_identical_write_is_not_a_change() {
        let mut set = ConditionSet::new();
        assert!(set.set(condition(ConditionType::Launched, ConditionStatus::True, "Launched", at(0))));
        assert!(!set.set(condition(ConditionType::Launched, ConditionStatus::True, "Launched", at(60))));
        assert_eq!(set.get(ConditionType::Launched).unwrap().last_transition_time, at(0));
    }

    #[test]
    fn test_transition_time_moves_only_on_status_change() {
        let mut set = ConditionSet::new();
        set.set(condition(ConditionType::Initialized, ConditionStatus::False, "NodeNotReady", at(0)));

        assert!(set.set(condition(ConditionType::Initialized, ConditionStatus::False, "StartupTaintsExist", at(10))));
        let current = set.get(ConditionType::Initialized).unwrap();
        assert_eq!(current.reason, "StartupTaintsExist");
        assert_eq!(current.last_transition_time, at(0));

        assert!(set.set(condition(ConditionType::Initialized, ConditionStatus::True, "Initialized", at(20))));
        assert_eq!(set.get(ConditionType::Initialized).unwrap().last_transition_time, at(20));
    }

    #[test]
    fn test_clear_and_initialize() {
        let mut set = ConditionSet::new();
        assert!(set.initialize(&ConditionType::ALL, "AwaitingReconciliation", at(0)));
        assert!(!set.initialize(&ConditionType::ALL, "AwaitingReconciliation", at(5)));
        assert_eq!(set.iter().count(), 3);

        assert!(set.clear(ConditionType::Registered));
        assert!(!set.clear(ConditionType::Registered));
        assert!(set.get(ConditionType::Registered).is_none());
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(ConditionType::Launched.predecessor(), None);
        assert_eq!(ConditionType::Registered.predecessor(), Some(ConditionType::Launched));
        assert_eq!(ConditionType::Initialized.predecessor(), Some(ConditionType::Registered));
    }

    #[test]
    fn test_foreign_conditions_survive_round_trip() {
        let set: ConditionSet = serde_json::from_value(serde_json::json!([
            { "type": "Initialized", "status": "False", "reason": "NodeNotReady", "lastTransitionTime": "2024-01-01T00:00:00Z" },
            { "type": "Drifted", "status": "True", "reason": "ImageChanged" },
            { "type": "Launched", "status": "True", "reason": "Launched", "lastTransitionTime": "2024-01-01T00:00:00Z" }
        ]))
        .unwrap();

        let order: Vec<_> = set.iter().map(|c| c.type_).collect();
        assert_eq!(order, vec![ConditionType::Launched, ConditionType::Initialized]);
        assert_eq!(set.foreign().len(), 1);

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json[2]["type"], "Drifted");
        assert_eq!(json[2]["reason"], "ImageChanged");
    }

    #[test]
    fn test_read_order_is_normalized() {
        let mut set: ConditionSet = serde_json::from_value(serde_json::json!([
            { "type": "Initialized", "status": "Unknown", "lastTransitionTime": "2024-01-01T00:00:00Z" },
            { "type": "Launched", "status": "True", "lastTransitionTime": "2024-01-01T00:00:00Z" }
        ]))
        .unwrap();
        set.set(condition(ConditionType::Registered, ConditionStatus::True, "Registered", at(0)));

        let order: Vec<_> = set.iter().map(|c| c.type_).collect();
        assert_eq!(order, ConditionType::ALL.to_vec());
    }

    #[test]
    fn test_unparseable_known_type_is_reinitialized() {
        let mut set: ConditionSet = serde_json::from_value(serde_json::json!([
            { "type": "Registered", "status": "Maybe" }
        ]))
        .unwrap();
        assert!(set.foreign().is_empty());
        assert!(set.initialize(&ConditionType::ALL, "AwaitingReconciliation", at(0)));
        assert_eq!(set.status(ConditionType::Registered), ConditionStatus::Unknown);
    }

    #[test]
    fn test_condition_wire_form() {
        let c = condition(ConditionType::Registered, ConditionStatus::False, "NodeNotFound", at(0));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "Registered");
        assert_eq!(json["status"], "False");
        assert_eq!(json["reason"], "NodeNotFound");
        assert!(json.get("lastTransitionTime").is_some());
    }
}
