//! Inventory of the objects a function owns and the diff towards a desired set.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::Value;

use crate::{kptfile::Condition, Error, KubeObject, ObjectRef, Result};

/// An object in an inventory diff.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InventoryObject {
    /// Reference the object is tracked under.
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    /// Object content, absent for condition deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<KubeObject>,
}

/// Changes required to move the existing inventory to the new resources.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDiff {
    /// Existing objects no longer desired.
    pub delete_objs: Vec<InventoryObject>,
    /// Desired objects whose spec differs from the existing one.
    pub update_objs: Vec<InventoryObject>,
    /// Desired objects that do not exist yet.
    pub create_objs: Vec<InventoryObject>,
    /// Conditions tracking objects that are no longer desired.
    pub delete_conditions: Vec<InventoryObject>,
    /// Desired objects that have no condition yet.
    pub create_conditions: Vec<InventoryObject>,
}

impl InventoryDiff {
    /// Reports whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.delete_objs.is_empty()
            && self.update_objs.is_empty()
            && self.create_objs.is_empty()
            && self.delete_conditions.is_empty()
            && self.create_conditions.is_empty()
    }
}

#[derive(Debug, Default)]
struct Entry {
    existing_condition: Option<Condition>,
    existing_resource: Option<KubeObject>,
    new_resource: Option<KubeObject>,
}

/// Tracks existing conditions, existing resources and new resources by object reference.
#[derive(Debug, Default)]
pub struct Inventory {
    resources: BTreeMap<ObjectRef, Entry>,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the condition currently tracking the referenced object.
    pub fn add_existing_condition(&mut self, reference: ObjectRef, condition: Condition) {
        self.resources.entry(reference).or_default().existing_condition = Some(condition);
    }

    /// Record an object that currently exists.
    pub fn add_existing_resource(&mut self, reference: ObjectRef, object: KubeObject) {
        self.resources.entry(reference).or_default().existing_resource = Some(object);
    }

    /// Record an object that should exist.
    pub fn add_new_resource(&mut self, reference: ObjectRef, object: KubeObject) {
        self.resources.entry(reference).or_default().new_resource = Some(object);
    }

    /// Compute the changes, ordered by object reference.
    pub fn diff(&self) -> Result<InventoryDiff> {
        let mut diff = InventoryDiff::default();
        for (reference, entry) in &self.resources {
            match (&entry.new_resource, &entry.existing_condition) {
                (None, Some(_)) => diff.delete_conditions.push(InventoryObject {
                    reference: reference.clone(),
                    object: None,
                }),
                (Some(new), None) => diff.create_conditions.push(InventoryObject {
                    reference: reference.clone(),
                    object: Some(new.clone()),
                }),
                _ => {}
            }

            match (&entry.existing_resource, &entry.new_resource) {
                (None, Some(new)) => diff.create_objs.push(InventoryObject {
                    reference: reference.clone(),
                    object: Some(new.clone()),
                }),
                (Some(existing), None) => diff.delete_objs.push(InventoryObject {
                    reference: reference.clone(),
                    object: Some(existing.clone()),
                }),
                (Some(existing), Some(new)) => {
                    let existing_spec = spec(existing)
                        .ok_or_else(|| Error::MissingExistingSpec(reference.clone()))?;
                    let new_spec =
                        spec(new).ok_or_else(|| Error::MissingNewSpec(reference.clone()))?;
                    if existing_spec != new_spec {
                        diff.update_objs.push(InventoryObject {
                            reference: reference.clone(),
                            object: Some(new.clone()),
                        });
                    }
                }
                (None, None) => {}
            }
        }
        Ok(diff)
    }
}

fn spec(object: &KubeObject) -> Option<&Value> {
    object.get(&["spec"]).filter(|spec| spec.is_mapping())
}
