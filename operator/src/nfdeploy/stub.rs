//! Builders for NfDeploy test fixtures.
use k8s_openapi::chrono::{DateTime, Utc};
use kube::core::ObjectMeta;

use crate::{
    conditions::ConditionStatus,
    nfdeploy::{
        deployment::EdgeEvent, status::NfCondition, Connectivity, NfDeploy, NfDeploySpec, NfType,
        Site,
    },
};

pub fn site(id: &str, nf_type: &str, neighbors: &[&str]) -> Site {
    Site {
        id: id.to_owned(),
        cluster_name: format!("{id}-cluster"),
        nf_type: nf_type.to_owned(),
        nf_vendor: "casa".to_owned(),
        nf_version: "1.0".to_owned(),
        connectivities: neighbors
            .iter()
            .map(|n| Connectivity {
                neighbor_name: n.to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

pub fn nf_deploy(name: &str, sites: Vec<Site>) -> NfDeploy {
    NfDeploy {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some("default".to_owned()),
            generation: Some(1),
            resource_version: Some("1".to_owned()),
            ..Default::default()
        },
        spec: NfDeploySpec {
            sites,
            ..Default::default()
        },
        status: None,
    }
}

/// A deployment with one UPF and one SMF connected to each other.
pub fn free5gc() -> NfDeploy {
    nf_deploy(
        "free5gc",
        vec![site("upf-1", "upf", &["smf-1"]), site("smf-1", "smf", &["upf-1"])],
    )
}

pub fn edge_event(
    site_id: &str,
    nf_type: NfType,
    conditions: &[(&str, ConditionStatus)],
    timestamp: DateTime<Utc>,
) -> EdgeEvent {
    EdgeEvent {
        nf_deploy: "free5gc".to_owned(),
        site_id: site_id.to_owned(),
        nf_type,
        conditions: conditions
            .iter()
            .map(|(type_, status)| NfCondition {
                type_: type_.to_string(),
                status: *status,
                message: String::new(),
            })
            .collect(),
        timestamp,
    }
}
