//! Porch resources are served by the porch API server. Only the fields the operator reads are typed.
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;

/// Lifecycle of a package revision.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy, JsonSchema)]
pub enum PackageRevisionLifecycle {
    #[default]
    Draft,
    Proposed,
    Published,
    DeletionProposed,
}

impl PackageRevisionLifecycle {
    /// Published revisions are immutable, including those proposed for deletion.
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published | Self::DeletionProposed)
    }
}

/// A condition that must be True before a package revision can be approved.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessGate {
    pub condition_type: String,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "porch.kpt.dev",
    version = "v1alpha1",
    kind = "PackageRevision",
    plural = "packagerevisions",
    status = "PackageRevisionStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PackageRevisionSpec {
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(default)]
    pub lifecycle: PackageRevisionLifecycle,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_gates: Vec<ReadinessGate>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct PackageRevisionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Reference to a package in a porch repository.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct PackageRef {
    #[serde(default, rename = "repo")]
    pub repository: String,
    #[serde(default)]
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "config.porch.kpt.dev",
    version = "v1alpha1",
    kind = "PackageVariant",
    plural = "packagevariants",
    status = "PackageVariantStatus",
    derive = "PartialEq",
    namespaced
)]
pub struct PackageVariantSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<PackageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<PackageRef>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct PackageVariantStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
