//! Untyped KRM objects.
use std::{collections::BTreeMap, fmt};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{Error, Result};

/// Reference to a KRM object by apiVersion, kind and name.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// API version, `group/version` or just `version` for the core group.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Kind of the object.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Name of the object.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace of the object, if namespaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Build a reference without a namespace.
    pub fn new(api_version: &str, kind: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_owned(),
            kind: kind.to_owned(),
            name: name.to_owned(),
            namespace: None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::kptfile::condition_type(self))
    }
}

/// A KRM object kept as a raw YAML mapping so unknown fields survive a round trip.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(transparent)]
pub struct KubeObject(Mapping);

impl KubeObject {
    /// Parse a single object from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Render the object as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn str_field(&self, path: &[&str]) -> &str {
        self.get(path).and_then(Value::as_str).unwrap_or_default()
    }

    /// apiVersion of the object, empty if unset.
    pub fn api_version(&self) -> &str {
        self.str_field(&["apiVersion"])
    }

    /// kind of the object, empty if unset.
    pub fn kind(&self) -> &str {
        self.str_field(&["kind"])
    }

    /// metadata.name of the object, empty if unset.
    pub fn name(&self) -> &str {
        self.str_field(&["metadata", "name"])
    }

    /// metadata.namespace of the object.
    pub fn namespace(&self) -> Option<&str> {
        self.get(&["metadata", "namespace"]).and_then(Value::as_str)
    }

    /// String valued annotations of the object.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.get(&["metadata", "annotations"])
            .and_then(Value::as_mapping)
            .map(|annotations| {
                annotations
                    .iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_owned(), v.as_str()?.to_owned())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reference to this object.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            api_version: self.api_version().to_owned(),
            kind: self.kind().to_owned(),
            name: self.name().to_owned(),
            namespace: self.namespace().map(str::to_owned),
        }
    }

    /// Reports whether both objects share apiVersion, kind and name.
    pub fn is_same_gvkn(&self, other: &KubeObject) -> bool {
        self.api_version() == other.api_version()
            && self.kind() == other.kind()
            && self.name() == other.name()
    }

    /// Look up a nested field.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
    }

    /// Look up a nested field and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, path: &[&str]) -> Result<Option<T>> {
        self.get(path)
            .map(|value| serde_yaml::from_value(value.clone()))
            .transpose()
            .map_err(Error::from)
    }

    /// Set a nested field, creating intermediate mappings as needed.
    pub fn set(&mut self, path: &[&str], value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::InvalidField {
                path: String::new(),
                reason: "empty path".to_owned(),
            });
        };
        let mut current = &mut self.0;
        for (i, key) in parents.iter().enumerate() {
            let entry = current
                .entry(Value::from(*key))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if entry.is_null() {
                *entry = Value::Mapping(Mapping::new());
            }
            current = entry.as_mapping_mut().ok_or_else(|| Error::InvalidField {
                path: path[..=i].join("."),
                reason: "not a mapping".to_owned(),
            })?;
        }
        current.insert(Value::from(*last), value);
        Ok(())
    }

    /// Serialize a value and set it at a nested field.
    pub fn set_as<T: Serialize>(&mut self, path: &[&str], value: &T) -> Result<()> {
        self.set(path, serde_yaml::to_value(value)?)
    }
}
