//! In memory topology of a single NfDeploy and the status of its network functions.
use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::nfdeploy::{
    status::{aggregate, AggregateStatus, NfCondition, NfConditionSet, NfStatus},
    NfDeploySpec, NfType,
};

/// A status change of a network function observed on an edge cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeEvent {
    /// Name of the NfDeploy the network function belongs to.
    pub nf_deploy: String,
    /// Site id of the network function.
    pub site_id: String,
    pub nf_type: NfType,
    pub conditions: Vec<NfCondition>,
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
}

/// A network function of the deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct NfNode {
    pub id: String,
    pub nf_type: NfType,
    pub cluster_name: String,
    pub status: NfStatus,
}

/// Undirected link between two network functions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge(String, String);

impl Edge {
    /// Create an edge, `Edge::new(a, b)` equals `Edge::new(b, a)`.
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Edge(a.to_owned(), b.to_owned())
        } else {
            Edge(b.to_owned(), a.to_owned())
        }
    }

    fn touches(&self, id: &str) -> bool {
        self.0 == id || self.1 == id
    }

    fn other(&self, id: &str) -> Option<&str> {
        if self.0 == id {
            Some(&self.1)
        } else if self.1 == id {
            Some(&self.0)
        } else {
            None
        }
    }
}

/// Graph of the network functions of one NfDeploy.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    name: String,
    namespace: String,
    nodes: BTreeMap<String, NfNode>,
    edges: BTreeSet<Edge>,
}

impl Deployment {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            nodes: BTreeMap::new(),
            edges: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Network function with the given site id.
    pub fn node(&self, id: &str) -> Option<&NfNode> {
        self.nodes.get(id)
    }

    /// Ids of the neighbors of a network function, sorted.
    pub fn connections(&self, id: &str) -> Vec<&str> {
        self.edges.iter().filter_map(|edge| edge.other(id)).collect()
    }

    /// Sync the graph with the sites of the spec.
    ///
    /// Nodes absent from the spec or whose type changed are dropped with their edges, status of
    /// unchanged nodes is kept.
    pub fn report_nf_deploy(&mut self, spec: &NfDeploySpec) {
        let sites: BTreeMap<&str, NfType> = spec
            .sites
            .iter()
            .filter_map(|site| Some((site.id.as_str(), NfType::parse(&site.nf_type)?)))
            .collect();

        let removed: Vec<String> = self
            .nodes
            .values()
            .filter(|node| sites.get(node.id.as_str()) != Some(&node.nf_type))
            .map(|node| node.id.clone())
            .collect();
        for id in removed {
            info!(deployment = %self.name, nf = %id, "removing NF from deployment");
            self.nodes.remove(&id);
            self.edges.retain(|edge| !edge.touches(&id));
        }

        for site in &spec.sites {
            let Some(nf_type) = NfType::parse(&site.nf_type) else {
                continue;
            };
            self.nodes
                .entry(site.id.clone())
                .and_modify(|node| node.cluster_name = site.cluster_name.clone())
                .or_insert_with(|| NfNode {
                    id: site.id.clone(),
                    nf_type,
                    cluster_name: site.cluster_name.clone(),
                    status: NfStatus::default(),
                });
        }

        self.edges = spec
            .sites
            .iter()
            .flat_map(|site| {
                site.connectivities
                    .iter()
                    .map(move |c| (site.id.as_str(), c.neighbor_name.as_str()))
            })
            .filter(|(a, b)| self.nodes.contains_key(*a) && self.nodes.contains_key(*b))
            .map(|(a, b)| Edge::new(a, b))
            .collect();
    }

    /// Network functions that count towards the deployment status, UPFs first.
    fn targeted(&self) -> Vec<(&str, &NfStatus)> {
        [NfType::Upf, NfType::Smf]
            .into_iter()
            .flat_map(|nf_type| {
                self.nodes
                    .values()
                    .filter(move |node| node.nf_type == nf_type)
                    .map(|node| (node.id.as_str(), &node.status))
            })
            .collect()
    }

    /// Aggregate status over the targeted network functions.
    pub fn aggregate(&self) -> AggregateStatus {
        aggregate(&self.targeted())
    }

    /// Apply an edge event, returning the new aggregate status if the event was accepted.
    pub fn process_edge_event(&mut self, event: &EdgeEvent) -> Option<AggregateStatus> {
        let Some(node) = self
            .nodes
            .get_mut(&event.site_id)
            .filter(|node| node.nf_type == event.nf_type)
        else {
            info!(deployment = %self.name, nf = %event.site_id, nf_type = %event.nf_type, "NF is not present in deployment");
            return None;
        };
        if node
            .status
            .last_event_timestamp
            .is_some_and(|last| event.timestamp < last)
        {
            info!(deployment = %self.name, nf = %event.site_id, "dropping stale NF event");
            return None;
        }
        node.status.last_event_timestamp = Some(event.timestamp);

        let conditions = NfConditionSet::new(&event.conditions);
        if conditions.is_ambiguous() {
            debug!(deployment = %self.name, nf = %event.site_id, ?event.conditions, "ambiguous NF conditions");
            return None;
        }
        node.status = NfStatus {
            last_event_timestamp: node.status.last_event_timestamp,
            ..conditions.nf_status()
        };
        Some(self.aggregate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conditions::ConditionStatus,
        nfdeploy::{
            status::NfConditionType,
            stub::{edge_event, site},
            NfDeployConditionType, NfDeployPhase,
        },
    };
    use k8s_openapi::chrono::TimeZone;

    fn spec() -> NfDeploySpec {
        NfDeploySpec {
            sites: vec![
                site("upf-1", "upf", &["smf-1"]),
                site("upf-2", "upf", &["smf-1"]),
                site("smf-1", "smf", &["upf-1", "upf-2", "amf-1"]),
                site("amf-1", "amf", &["smf-1"]),
            ],
            ..Default::default()
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn builds_graph() {
        let mut deployment = Deployment::new("free5gc", "default");
        deployment.report_nf_deploy(&spec());
        assert_eq!(deployment.connections("smf-1"), vec!["amf-1", "upf-1", "upf-2"]);
        assert_eq!(deployment.connections("upf-1"), vec!["smf-1"]);
        assert_eq!(deployment.node("amf-1").map(|n| n.nf_type), Some(NfType::Amf));
        // AMFs are tracked but not targeted.
        assert_eq!(deployment.aggregate().targeted_nfs, 3);
    }

    #[test]
    fn edges_are_undirected() {
        assert_eq!(Edge::new("a", "b"), Edge::new("b", "a"));
    }

    #[test]
    fn removes_dropped_and_retyped_nodes() {
        let mut deployment = Deployment::new("free5gc", "default");
        deployment.report_nf_deploy(&spec());
        deployment.process_edge_event(&edge_event(
            "upf-1",
            NfType::Upf,
            &[("Ready", ConditionStatus::True)],
            at(0),
        ));

        let mut updated = spec();
        updated.sites.retain(|s| s.id != "upf-2");
        updated.sites[0].cluster_name = "edge02".to_owned();
        updated.sites[1].nf_type = "upf".to_owned();
        deployment.report_nf_deploy(&updated);

        assert!(deployment.node("upf-2").is_none());
        assert!(deployment.connections("upf-2").is_empty());
        assert_eq!(deployment.node("smf-1").map(|n| n.nf_type), Some(NfType::Upf));
        let upf = deployment.node("upf-1").unwrap();
        assert_eq!(upf.cluster_name, "edge02");
        assert_eq!(upf.status.state, Some(NfConditionType::Ready));
        assert_eq!(deployment.connections("smf-1"), vec!["amf-1", "upf-1"]);
    }

    #[test]
    fn edge_events_update_status() {
        let mut deployment = Deployment::new("free5gc", "default");
        deployment.report_nf_deploy(&spec());

        let status = deployment
            .process_edge_event(&edge_event(
                "upf-1",
                NfType::Upf,
                &[("Ready", ConditionStatus::True), ("Available", ConditionStatus::True)],
                at(1),
            ))
            .unwrap();
        assert_eq!(status.ready_nfs, 1);
        assert_eq!(status.phase, NfDeployPhase::Unknown);
        let ready = &status.conditions[1];
        assert_eq!(ready.type_, NfDeployConditionType::Ready);
        assert_eq!(
            ready.message,
            "The NFs which are not in Ready state are: upf-2, smf-1."
        );

        // Stale events are dropped.
        assert!(deployment
            .process_edge_event(&edge_event(
                "upf-1",
                NfType::Upf,
                &[("Stalled", ConditionStatus::True)],
                at(0),
            ))
            .is_none());
        // Unknown NFs and mismatched kinds are dropped.
        assert!(deployment
            .process_edge_event(&edge_event("upf-9", NfType::Upf, &[], at(2)))
            .is_none());
        assert!(deployment
            .process_edge_event(&edge_event(
                "smf-1",
                NfType::Upf,
                &[("Ready", ConditionStatus::True)],
                at(2),
            ))
            .is_none());
        // Ambiguous sets are dropped.
        assert!(deployment
            .process_edge_event(&edge_event(
                "smf-1",
                NfType::Smf,
                &[("Ready", ConditionStatus::False)],
                at(2),
            ))
            .is_none());

        let status = deployment
            .process_edge_event(&edge_event(
                "smf-1",
                NfType::Smf,
                &[("Reconciling", ConditionStatus::True)],
                at(3),
            ))
            .unwrap();
        assert_eq!(status.phase, NfDeployPhase::Reconciling);
        assert_eq!(
            deployment.node("smf-1").unwrap().status.last_event_timestamp,
            Some(at(3))
        );
    }
}
