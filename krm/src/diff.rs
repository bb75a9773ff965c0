//! Name keyed diff of two resource lists holding a single GVK.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    kptfile::{condition_type, Condition, ConditionStatus, Kptfile},
    KubeObject, ObjectRef, Result,
};

/// Changes between a current and a new list, each sorted by name.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct ResourceListDiff {
    /// Objects only in the new list.
    pub create: Vec<ObjectRef>,
    /// Objects in both lists whose content differs.
    pub update: Vec<ObjectRef>,
    /// Objects only in the current list.
    pub delete: Vec<ObjectRef>,
    /// Objects in both lists with identical content.
    pub unchanged: Vec<ObjectRef>,
}

impl ResourceListDiff {
    /// Reports whether the lists differ.
    pub fn has_changes(&self) -> bool {
        !(self.create.is_empty() && self.update.is_empty() && self.delete.is_empty())
    }

    /// Project the diff onto the conditions of a Kptfile.
    pub fn apply_to_kptfile(&self, kptfile: &mut Kptfile) -> Result<()> {
        for reference in &self.delete {
            kptfile.delete_condition_ref(reference)?;
        }
        let mut conditions: Vec<Condition> = self
            .create
            .iter()
            .map(|reference| Condition::new(condition_type(reference), ConditionStatus::False))
            .collect();
        conditions.extend(self.update.iter().map(|reference| Condition {
            reason: "kpt condition was updated".to_owned(),
            message: "change occurred due to kpt function".to_owned(),
            ..Condition::new(condition_type(reference), ConditionStatus::False)
        }));
        kptfile.set_conditions(&conditions)
    }
}

fn same_content(a: &KubeObject, b: &KubeObject) -> Result<bool> {
    Ok(a.to_yaml()? == b.to_yaml()?)
}

/// Compare two lists by object name.
///
/// Lists holding the same objects in the same order give an empty diff.
pub fn diff(current: &[KubeObject], new: &[KubeObject]) -> Result<ResourceListDiff> {
    if current.len() == new.len() {
        let mut identical = true;
        for (a, b) in current.iter().zip(new) {
            if !same_content(a, b)? {
                identical = false;
                break;
            }
        }
        if identical {
            return Ok(ResourceListDiff::default());
        }
    }

    let current: BTreeMap<&str, &KubeObject> = current.iter().map(|o| (o.name(), o)).collect();
    let new: BTreeMap<&str, &KubeObject> = new.iter().map(|o| (o.name(), o)).collect();

    let mut diff = ResourceListDiff::default();
    for (name, new_obj) in &new {
        match current.get(name) {
            Some(current_obj) if same_content(current_obj, new_obj)? => {
                diff.unchanged.push(new_obj.object_ref())
            }
            Some(_) => diff.update.push(new_obj.object_ref()),
            None => diff.create.push(new_obj.object_ref()),
        }
    }
    diff.delete = current
        .iter()
        .filter(|(name, _)| !new.contains_key(*name))
        .map(|(_, o)| o.object_ref())
        .collect();
    Ok(diff)
}
