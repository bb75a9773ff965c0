//! Kptfile status conditions and readiness gates.
//!
//! Every object a function owns is tracked by a condition on the Kptfile. The condition type
//! is derived from the object's reference, see [`condition_type`].
use serde::{Deserialize, Serialize};

use crate::{KubeObject, ObjectRef, Result};

/// API version of a Kptfile.
pub const KPTFILE_API_VERSION: &str = "kpt.dev/v1";
/// Kind of a Kptfile.
pub const KPTFILE_KIND: &str = "Kptfile";

/// Status of a Kptfile condition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition does not hold.
    False,
    /// Condition is not known yet.
    Unknown,
}

/// A condition in the Kptfile status.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Condition type.
    #[serde(rename = "type")]
    pub type_: String,
    /// Condition status.
    pub status: ConditionStatus,
    /// Machine readable reason.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Human readable message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    /// Build a condition without reason or message.
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: String::new(),
            message: String::new(),
        }
    }
}

/// A readiness gate entry of the Kptfile info.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessGate {
    /// Condition type that has to be True for the package to be ready.
    pub condition_type: String,
}

/// Build the condition type for an object reference as `group/version.Kind.name`.
///
/// Empty parts are skipped, an apiVersion that is not a valid group/version is dropped.
pub fn condition_type(reference: &ObjectRef) -> String {
    let mut parts = Vec::with_capacity(3);
    if !reference.api_version.is_empty() && reference.api_version.matches('/').count() <= 1 {
        parts.push(reference.api_version.as_str());
    }
    if !reference.kind.is_empty() {
        parts.push(reference.kind.as_str());
    }
    if !reference.name.is_empty() {
        parts.push(reference.name.as_str());
    }
    parts.join(".")
}

/// Parse an object reference back from a condition type.
///
/// Returns `None` unless the type has a version, kind and name.
pub fn object_ref_from_condition_type(condition_type: &str) -> Option<ObjectRef> {
    let (group, vkn) = match condition_type.split_once('/') {
        Some((group, rest)) => (group, rest.split('/').next().unwrap_or_default()),
        None => ("", condition_type),
    };
    let parts: Vec<&str> = vkn.split('.').collect();
    let [version, kind, name] = parts.as_slice() else {
        return None;
    };
    let api_version = if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    };
    Some(ObjectRef::new(&api_version, kind, name))
}

/// A Kptfile backed by its raw object so unrelated fields are preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Kptfile {
    object: KubeObject,
}

impl Kptfile {
    /// Wrap a Kptfile object.
    pub fn new(object: KubeObject) -> Self {
        Self { object }
    }

    /// Parse a Kptfile from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::new(KubeObject::from_yaml(yaml)?))
    }

    /// Reports whether an object is a Kptfile.
    pub fn is_kptfile(object: &KubeObject) -> bool {
        object.api_version() == KPTFILE_API_VERSION && object.kind() == KPTFILE_KIND
    }

    /// Underlying object.
    pub fn object(&self) -> &KubeObject {
        &self.object
    }

    /// Consume the Kptfile, returning the underlying object.
    pub fn into_object(self) -> KubeObject {
        self.object
    }

    /// Readiness gates from `info.readinessGates`.
    pub fn readiness_gates(&self) -> Result<Vec<ReadinessGate>> {
        Ok(self
            .object
            .get_as(&["info", "readinessGates"])?
            .unwrap_or_default())
    }

    /// Reports whether a readiness gate for the condition type exists.
    pub fn has_readiness_gate(&self, condition_type: &str) -> Result<bool> {
        Ok(self
            .readiness_gates()?
            .iter()
            .any(|gate| gate.condition_type == condition_type))
    }

    /// Add readiness gates for the condition types that do not have one yet.
    pub fn set_readiness_gates<S: AsRef<str>>(&mut self, condition_types: &[S]) -> Result<()> {
        let mut gates = self.readiness_gates()?;
        for condition_type in condition_types {
            let condition_type = condition_type.as_ref();
            if !gates.iter().any(|gate| gate.condition_type == condition_type) {
                gates.push(ReadinessGate {
                    condition_type: condition_type.to_owned(),
                });
            }
        }
        self.object.set_as(&["info", "readinessGates"], &gates)
    }

    /// Conditions from `status.conditions`.
    pub fn conditions(&self) -> Result<Vec<Condition>> {
        Ok(self
            .object
            .get_as(&["status", "conditions"])?
            .unwrap_or_default())
    }

    /// Condition with the given type.
    pub fn condition(&self, condition_type: &str) -> Result<Option<Condition>> {
        Ok(self
            .conditions()?
            .into_iter()
            .find(|c| c.type_ == condition_type))
    }

    /// Overwrite conditions with a matching type and append the others.
    pub fn set_conditions(&mut self, new_conditions: &[Condition]) -> Result<()> {
        let mut conditions = self.conditions()?;
        for new in new_conditions {
            match conditions.iter_mut().find(|c| c.type_ == new.type_) {
                Some(existing) => *existing = new.clone(),
                None => conditions.push(new.clone()),
            }
        }
        self.object.set_as(&["status", "conditions"], &conditions)
    }

    /// Remove every condition with the given type.
    pub fn delete_condition(&mut self, condition_type: &str) -> Result<()> {
        let mut conditions = self.conditions()?;
        conditions.retain(|c| c.type_ != condition_type);
        self.object.set_as(&["status", "conditions"], &conditions)
    }

    /// Remove the condition tracking the referenced object.
    pub fn delete_condition_ref(&mut self, reference: &ObjectRef) -> Result<()> {
        self.delete_condition(&condition_type(reference))
    }

    /// Mark the condition tracking the referenced object as failed with a message.
    pub fn set_condition_ref_failed(&mut self, reference: &ObjectRef, message: &str) -> Result<()> {
        let condition_type = condition_type(reference);
        let mut condition = self
            .condition(&condition_type)?
            .unwrap_or_else(|| Condition::new(condition_type, ConditionStatus::False));
        condition.status = ConditionStatus::False;
        condition.message = message.to_owned();
        self.set_conditions(&[condition])
    }

    /// Reports whether at least one condition has the prefix and none of them is False.
    pub fn is_ready(&self, prefix: &str) -> Result<bool> {
        let mut found = false;
        for condition in self.conditions()? {
            if condition.type_.starts_with(prefix) {
                found = true;
                if condition.status == ConditionStatus::False {
                    return Ok(false);
                }
            }
        }
        Ok(found)
    }
}
