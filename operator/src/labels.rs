use std::collections::BTreeMap;

/// Manage by label
pub const MANAGED_BY_LABEL_SELECTOR: &str = "managed-by=nephio";

/// Labels that indicate the resource is managed by the nephio operator.
pub fn managed_labels() -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from_iter(vec![(
        "managed-by".to_owned(),
        "nephio".to_owned(),
    )]))
}

/// Name of the NfDeploy an edge NF deployment belongs to.
pub const NF_DEPLOY_LABEL: &str = "nephio.org/nfdeploy-name";

/// Site id of an edge NF deployment within its NfDeploy.
pub const NF_SITE_ID_LABEL: &str = "nephio.org/nf-site-id";
