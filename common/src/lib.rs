//! Provides types and functions common to the operator and the KRM tooling.
#![deny(missing_docs)]
pub mod naming;
#[cfg(feature = "telemetry")]
pub mod telemetry;
