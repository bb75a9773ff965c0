//! Typed access to the porch package orchestration API and the package approval controller.
mod spec;
pub use spec::*;

pub mod conditions;

#[cfg(feature = "controller")]
pub mod approval;
