//! Repository custom resource, backed by a repository on the gitea server.
mod spec;
pub use spec::*;

#[cfg(feature = "controller")]
pub mod controller;
