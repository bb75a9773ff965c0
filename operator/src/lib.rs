//! Provides API for the operator and related tooling.
#![warn(missing_docs)]

/// Status conditions shared by the custom resources.
pub mod conditions;
/// Gitea client used by the repository and token controllers.
#[cfg(feature = "controller")]
pub mod gitea;
/// Labels module for managing resource labels.
#[cfg(feature = "controller")]
pub(crate) mod labels;
/// Lifecycle settings of the infra.nephio.org resources.
pub mod lifecycle;
/// NfDeploy module for network function deployments.
pub mod nfdeploy;
/// Porch module for package revision approval.
pub mod porch;
/// Repository module for git repositories.
pub mod repository;
/// Token module for git access tokens.
pub mod token;
/// Utils module for shared utility functions.
#[cfg(feature = "controller")]
pub mod utils;

/// A list of constants used in various K8s resources
#[cfg(feature = "controller")]
const CONTROLLER_NAME: &str = "nephio";
