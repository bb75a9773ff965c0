//! Helpers for working with KRM resource lists as produced and consumed by kpt functions.
#![warn(missing_docs)]

pub mod diff;
pub mod inventory;
pub mod kptfile;
pub mod object;
pub mod resource_list;

pub use object::{KubeObject, ObjectRef};
pub use resource_list::ResourceList;

/// Errors produced while reading or diffing KRM objects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Object could not be (de)serialized.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying serde error.
        #[from]
        source: serde_yaml::Error,
    },
    /// Existing object has no spec map.
    #[error("cannot get spec of existing object: {0}")]
    MissingExistingSpec(ObjectRef),
    /// New object has no spec map.
    #[error("cannot get spec of new object: {0}")]
    MissingNewSpec(ObjectRef),
    /// A nested field path could not be written.
    #[error("cannot set field {path}: {reason}")]
    InvalidField {
        /// Dotted path of the field.
        path: String,
        /// Why the write failed.
        reason: String,
    },
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
