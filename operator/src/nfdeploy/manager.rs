//! Tracks every NfDeploy and writes the status aggregated from edge events back to it.
use std::collections::BTreeMap;

use k8s_openapi::chrono::{DateTime, Utc};
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::nfdeploy::{
    deployment::{Deployment, EdgeEvent},
    status::{edge_failure, merge_conditions, AggregateStatus},
    NfDeploy, NfDeployStatus,
};

/// Number of attempts to write a status that keeps conflicting.
const MAX_STATUS_ATTEMPTS: usize = 5;

#[derive(Default)]
struct State {
    deployments: BTreeMap<String, Deployment>,
    /// Latest edge event per NfDeploy name and site id, replayed on NFs that join a deployment
    /// after their edge object was observed.
    edge_events: BTreeMap<(String, String), EdgeEvent>,
}

/// Deployments keyed by NfDeploy name.
#[derive(Default)]
pub struct DeploymentManager {
    state: Mutex<State>,
}

impl DeploymentManager {
    /// Start tracking an NfDeploy or sync its topology with a new spec.
    ///
    /// NFs that have not seen an edge event yet get the latest one observed for their site, and
    /// the resulting status is written if any of them was accepted.
    pub async fn report_nf_deploy_event(
        &self,
        k_client: Client,
        now: DateTime<Utc>,
        nf_deploy: &NfDeploy,
    ) -> Result<(), kube::Error> {
        let name = nf_deploy.name_any();
        let namespace = nf_deploy.namespace().unwrap_or_default();
        let update = {
            let mut state = self.state.lock().await;
            let State {
                deployments,
                edge_events,
            } = &mut *state;
            let deployment = deployments.entry(name.clone()).or_insert_with(|| {
                info!(%name, "tracking new deployment");
                Deployment::new(&name, &namespace)
            });
            deployment.report_nf_deploy(&nf_deploy.spec);

            let mut replayed = false;
            for event in edge_events
                .range((name.clone(), String::new())..)
                .take_while(|((nf_deploy, _), _)| *nf_deploy == name)
                .map(|(_, event)| event)
            {
                let pending = deployment
                    .node(&event.site_id)
                    .is_some_and(|node| node.status.last_event_timestamp.is_none());
                if pending && deployment.process_edge_event(event).is_some() {
                    debug!(%name, nf = %event.site_id, "replayed edge event");
                    replayed = true;
                }
            }
            replayed.then(|| deployment.aggregate())
        };
        match update {
            Some(status) => write_status(k_client, &namespace, &name, status, now).await,
            None => Ok(()),
        }
    }

    /// Stop tracking an NfDeploy.
    pub async fn report_nf_deploy_delete_event(&self, name: &str) {
        if self.state.lock().await.deployments.remove(name).is_some() {
            info!(name, "stopped tracking deployment");
        }
    }

    /// Forget the edge event of a site whose edge object was deleted.
    pub async fn report_edge_delete_event(&self, nf_deploy: &str, site_id: &str) {
        self.state
            .lock()
            .await
            .edge_events
            .remove(&(nf_deploy.to_owned(), site_id.to_owned()));
    }

    /// Snapshot of a tracked deployment.
    pub async fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state.lock().await.deployments.get(name).cloned()
    }

    /// Record an edge event, apply it and write the resulting status to the NfDeploy.
    ///
    /// Events for untracked deployments are only recorded.
    pub async fn process_edge_event(
        &self,
        k_client: Client,
        now: DateTime<Utc>,
        event: EdgeEvent,
    ) -> Result<(), kube::Error> {
        let update = {
            let mut state = self.state.lock().await;
            let key = (event.nf_deploy.clone(), event.site_id.clone());
            if state
                .edge_events
                .get(&key)
                .map_or(true, |last| last.timestamp <= event.timestamp)
            {
                state.edge_events.insert(key, event.clone());
            }
            let Some(deployment) = state.deployments.get_mut(&event.nf_deploy) else {
                debug!(nf_deploy = %event.nf_deploy, "edge event for untracked deployment");
                return Ok(());
            };
            deployment
                .process_edge_event(&event)
                .map(|status| (deployment.namespace().to_owned(), status))
        };
        match update {
            Some((namespace, status)) => {
                write_status(k_client, &namespace, &event.nf_deploy, status, now).await
            }
            None => Ok(()),
        }
    }

    /// Mark every tracked deployment as unknown because the edge cannot be observed.
    pub async fn report_edge_failure(
        &self,
        k_client: Client,
        now: DateTime<Utc>,
        reason: &str,
        message: &str,
    ) -> Result<(), kube::Error> {
        let targets: Vec<(String, String)> = self
            .state
            .lock()
            .await
            .deployments
            .values()
            .map(|d| (d.namespace().to_owned(), d.name().to_owned()))
            .collect();
        for (namespace, name) in targets {
            write_status(
                k_client.clone(),
                &namespace,
                &name,
                edge_failure(reason, message),
                now,
            )
            .await?;
        }
        Ok(())
    }
}

/// Merge an aggregate status into the NfDeploy status, retrying on conflicts.
async fn write_status(
    k_client: Client,
    namespace: &str,
    name: &str,
    aggregate: AggregateStatus,
    now: DateTime<Utc>,
) -> Result<(), kube::Error> {
    let nf_deploys: Api<NfDeploy> = Api::namespaced(k_client, namespace);
    let mut attempt = 1;
    loop {
        let current = nf_deploys.get(name).await?;
        let existing = current.status.clone().unwrap_or_default();
        let status = NfDeployStatus {
            observed_generation: existing.observed_generation,
            targeted_nfs: aggregate.targeted_nfs,
            ready_nfs: aggregate.ready_nfs,
            available_nfs: aggregate.available_nfs,
            stalled_nfs: aggregate.stalled_nfs,
            phase: aggregate.phase,
            conditions: merge_conditions(&existing.conditions, aggregate.conditions.clone(), now),
        };
        let patch = json!({
            "metadata": { "resourceVersion": current.resource_version() },
            "status": status,
        });
        match nf_deploys
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(name, phase = ?status.phase, "nfdeploy status updated");
                return Ok(());
            }
            Err(kube::Error::Api(err)) if err.code == 409 && attempt < MAX_STATUS_ATTEMPTS => {
                warn!(name, attempt, "conflict writing nfdeploy status, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
