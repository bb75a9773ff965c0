//! Token custom resource, backed by a gitea access token and a basic auth secret.
mod spec;
pub use spec::*;

#[cfg(feature = "controller")]
pub mod controller;
