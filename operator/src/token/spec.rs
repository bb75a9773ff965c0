//! Place all spec types into a single module so they can be used as a lightweight dependency
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{conditions::Condition, lifecycle::Lifecycle};

/// An access token of the gitea admin user, exposed to the cluster as a secret.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "infra.nephio.org",
    version = "v1alpha1",
    kind = "Token",
    plural = "tokens",
    status = "TokenStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TokenSpec {
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// Observed state of a Token.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct TokenStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Token {
    /// Name of the token on the gitea server, unique across namespaces.
    pub fn token_name(&self) -> String {
        format!(
            "{}-{}",
            self.name_any(),
            self.namespace().unwrap_or_default()
        )
    }
}
