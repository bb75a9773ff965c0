//! NfDeploy custom resource and the controller aggregating the status of its network functions.
mod spec;
pub use spec::*;

#[cfg(feature = "controller")]
pub mod controller;
#[cfg(feature = "controller")]
pub mod deployment;
#[cfg(feature = "controller")]
pub mod edge;
#[cfg(feature = "controller")]
mod manager;
#[cfg(feature = "controller")]
pub mod status;
#[cfg(feature = "controller")]
pub mod validate;

#[cfg(feature = "controller")]
pub use manager::DeploymentManager;

#[cfg(test)]
pub mod stub;
