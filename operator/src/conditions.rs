//! Status conditions shared by the Nephio custom resources.
use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::Time,
    chrono::{DateTime, Utc},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reporting whether the resource has been reconciled.
pub const READY: &str = "Ready";

/// Status of a condition.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy, JsonSchema)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition does not hold.
    False,
    /// Condition has not been determined.
    #[default]
    Unknown,
}

/// A status condition.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of the condition.
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition.
    pub status: ConditionStatus,
    /// Machine readable reason for the last transition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Human readable details.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Last time the status changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

impl Condition {
    /// The resource is reconciled.
    pub fn ready() -> Self {
        Self {
            type_: READY.to_owned(),
            status: ConditionStatus::True,
            reason: "Ready".to_owned(),
            ..Default::default()
        }
    }

    /// The resource failed to reconcile.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            type_: READY.to_owned(),
            status: ConditionStatus::False,
            reason: "Failed".to_owned(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Replace the condition of the same type or append it.
///
/// lastTransitionTime is carried over when the status does not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition, now: DateTime<Utc>) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone().or(Some(Time(now)))
            } else {
                Some(Time(now))
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(Time(now));
            conditions.push(condition);
        }
    }
}
