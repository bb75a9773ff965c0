//! Lifecycle settings shared by the infra.nephio.org resources.
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What happens to the external resource when the custom resource is deleted.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Delete the external resource.
    #[default]
    Delete,
    /// Leave the external resource in place.
    Orphan,
}

/// Lifecycle of the external resource backing a custom resource.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// Finalizer that keeps an infra.nephio.org resource until its external resource is handled.
pub const INFRA_FINALIZER: &str = "infra.nephio.org/finalizer";
