//! The `config.kubernetes.io/v1` ResourceList exchanged with kpt functions.
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{kptfile::Kptfile, KubeObject, ObjectRef, Result};

fn default_api_version() -> String {
    "config.kubernetes.io/v1".to_owned()
}

fn default_kind() -> String {
    "ResourceList".to_owned()
}

/// Severity of a function result.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The function failed on the object.
    Error,
    /// Something is off but processing continued.
    Warning,
    /// Informational.
    Info,
}

/// A result reported by a function.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FnResult {
    /// Result message.
    pub message: String,
    /// Result severity.
    pub severity: Severity,
    /// Object the result is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<ObjectRef>,
}

/// A list of KRM objects plus the function config and results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_kind")]
    kind: String,
    /// Objects in the list.
    #[serde(default)]
    pub items: Vec<KubeObject>,
    /// Configuration of the function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_config: Option<KubeObject>,
    /// Results reported by functions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FnResult>,
}

impl Default for ResourceList {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            items: Vec::new(),
            function_config: None,
            results: Vec::new(),
        }
    }
}

impl ResourceList {
    /// Build a list from objects.
    pub fn new(items: Vec<KubeObject>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// Parse a list from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Render the list as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Append an error result, optionally about an object.
    pub fn add_result(&mut self, err: impl Display, object: Option<&KubeObject>) {
        self.results.push(FnResult {
            message: err.to_string(),
            severity: Severity::Error,
            resource_ref: object.map(KubeObject::object_ref),
        });
    }

    /// Object with the same apiVersion, kind and name.
    pub fn object(&self, like: &KubeObject) -> Option<&KubeObject> {
        self.items.iter().find(|o| o.is_same_gvkn(like))
    }

    /// Replace the object with the same apiVersion, kind and name or append it.
    pub fn set_object(&mut self, object: KubeObject) {
        match self.items.iter_mut().find(|o| o.is_same_gvkn(&object)) {
            Some(existing) => *existing = object,
            None => self.items.push(object),
        }
    }

    /// Remove every object with the same apiVersion, kind and name.
    pub fn delete_object(&mut self, like: &KubeObject) {
        self.items.retain(|o| !o.is_same_gvkn(like));
    }

    /// The Kptfile of the package, if present.
    pub fn kptfile(&self) -> Option<Kptfile> {
        self.items
            .iter()
            .find(|o| Kptfile::is_kptfile(o))
            .cloned()
            .map(Kptfile::new)
    }

    /// Replace the Kptfile of the package.
    pub fn set_kptfile(&mut self, kptfile: Kptfile) {
        self.set_object(kptfile.into_object());
    }

    /// Objects other than the Kptfile.
    pub fn resources(&self) -> impl Iterator<Item = &KubeObject> {
        self.items.iter().filter(|o| !Kptfile::is_kptfile(o))
    }
}
