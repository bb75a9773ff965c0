//! Structural checks of an NfDeploy before its topology is tracked.
use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;

use crate::nfdeploy::{NfDeploy, NfType};

/// Reasons an NfDeploy is rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("NFDeploy name cannot be empty")]
    EmptyName,
    #[error("NF with id - {0} is already present")]
    DuplicateNf(String),
    #[error("NFType {0} is unrecognised")]
    UnknownNfType(String),
    #[error("Multiple connections found between {0} and {1}")]
    DuplicateConnection(String, String),
    #[error("NF with id {0} is not present")]
    MissingNeighbor(String),
    #[error("Connectivity between {0} and {1} is not present")]
    AsymmetricConnection(String, String),
}

/// Validate the name, site ids, NF types and symmetric connectivity of an NfDeploy.
pub fn validate(nf_deploy: &NfDeploy) -> Result<(), ValidationError> {
    if nf_deploy.name_any().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let mut ids = BTreeSet::new();
    for site in &nf_deploy.spec.sites {
        if !ids.insert(site.id.as_str()) {
            return Err(ValidationError::DuplicateNf(site.id.clone()));
        }
        if NfType::parse(&site.nf_type).is_none() {
            return Err(ValidationError::UnknownNfType(site.nf_type.clone()));
        }
    }

    // Ids are unique past this point, so each site owns its neighbor set.
    let mut neighbors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for site in &nf_deploy.spec.sites {
        let site_neighbors = neighbors.entry(site.id.as_str()).or_default();
        for connectivity in &site.connectivities {
            if !site_neighbors.insert(connectivity.neighbor_name.as_str()) {
                return Err(ValidationError::DuplicateConnection(
                    site.id.clone(),
                    connectivity.neighbor_name.clone(),
                ));
            }
        }
    }

    for site in &nf_deploy.spec.sites {
        for connectivity in &site.connectivities {
            let neighbor = connectivity.neighbor_name.as_str();
            if !ids.contains(neighbor) {
                return Err(ValidationError::MissingNeighbor(neighbor.to_owned()));
            }
            match neighbors.get(neighbor) {
                Some(back) if back.contains(site.id.as_str()) => {}
                _ => {
                    return Err(ValidationError::AsymmetricConnection(
                        neighbor.to_owned(),
                        site.id.clone(),
                    ))
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfdeploy::{
        stub::{nf_deploy, site},
        NfDeploySpec,
    };

    #[test]
    fn valid_topology() {
        let nf_deploy = nf_deploy(
            "free5gc",
            vec![
                site("upf-1", "upf", &["smf-1"]),
                site("smf-1", "smf", &["upf-1", "amf-1"]),
                site("amf-1", "amf", &["smf-1"]),
            ],
        );
        assert_eq!(validate(&nf_deploy), Ok(()));
    }

    #[test]
    fn empty_name() {
        let nf_deploy = NfDeploy::new("", NfDeploySpec::default());
        assert_eq!(validate(&nf_deploy), Err(ValidationError::EmptyName));
    }

    #[test]
    fn duplicate_site() {
        let nf_deploy = nf_deploy(
            "free5gc",
            vec![site("upf-1", "upf", &[]), site("upf-1", "upf", &[])],
        );
        assert_eq!(
            validate(&nf_deploy).unwrap_err().to_string(),
            "NF with id - upf-1 is already present"
        );
    }

    #[test]
    fn unknown_nf_type() {
        let nf_deploy = nf_deploy("free5gc", vec![site("nrf-1", "unspecified", &[])]);
        assert_eq!(
            validate(&nf_deploy).unwrap_err().to_string(),
            "NFType unspecified is unrecognised"
        );
    }

    #[test]
    fn duplicate_connection() {
        let nf_deploy = nf_deploy(
            "free5gc",
            vec![
                site("upf-1", "upf", &["smf-1", "smf-1"]),
                site("smf-1", "smf", &["upf-1"]),
            ],
        );
        assert_eq!(
            validate(&nf_deploy).unwrap_err().to_string(),
            "Multiple connections found between upf-1 and smf-1"
        );
    }

    #[test]
    fn site_errors_before_connection_errors() {
        let duplicate_site = nf_deploy(
            "free5gc",
            vec![
                site("upf-1", "upf", &["smf-1", "smf-1"]),
                site("upf-1", "upf", &[]),
                site("smf-1", "smf", &["upf-1"]),
            ],
        );
        assert_eq!(
            validate(&duplicate_site),
            Err(ValidationError::DuplicateNf("upf-1".to_owned()))
        );

        let unknown_type = nf_deploy(
            "free5gc",
            vec![
                site("upf-1", "upf", &["smf-1", "smf-1"]),
                site("smf-1", "smf", &["upf-1"]),
                site("nrf-1", "unspecified", &[]),
            ],
        );
        assert_eq!(
            validate(&unknown_type),
            Err(ValidationError::UnknownNfType("unspecified".to_owned()))
        );
    }

    #[test]
    fn missing_neighbor() {
        let nf_deploy = nf_deploy("free5gc", vec![site("upf-1", "upf", &["smf-1"])]);
        assert_eq!(
            validate(&nf_deploy).unwrap_err().to_string(),
            "NF with id smf-1 is not present"
        );
    }

    #[test]
    fn asymmetric_connection() {
        let nf_deploy = nf_deploy(
            "free5gc",
            vec![site("upf-1", "upf", &["smf-1"]), site("smf-1", "smf", &[])],
        );
        assert_eq!(
            validate(&nf_deploy).unwrap_err().to_string(),
            "Connectivity between smf-1 and upf-1 is not present"
        );
    }
}
