//! Place all spec types into a single module so they can be used as a lightweight dependency
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{conditions::Condition, lifecycle::Lifecycle};

/// A git repository hosted on the gitea server.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "infra.nephio.org",
    version = "v1alpha1",
    kind = "Repository",
    plural = "repositories",
    status = "RepositoryStatus",
    derive = "PartialEq",
    namespaced,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Description of the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the repository is private.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    /// Issue label set to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_labels: Option<String>,
    /// Gitignores to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitignores: Option<String>,
    /// License to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Readme of the repository to create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    /// Default branch of the repository, used when initializing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    /// One of default, collaborator, committer or collaboratorcommitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_model: Option<String>,
}

/// Observed state of a Repository.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct RepositoryStatus {
    /// Clone url of the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
