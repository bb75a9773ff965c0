//! Watches UPFDeployment and SMFDeployment objects and turns their status into edge events.
use std::sync::Arc;

use futures::{stream, StreamExt};
use k8s_openapi::chrono::{DateTime, Utc};
use kube::{
    api::{ApiResource, DynamicObject, GroupVersionKind},
    runtime::{watcher, WatchStreamExt},
    Api, ResourceExt,
};
use tracing::{debug, error, warn};

use crate::{
    labels::{NF_DEPLOY_LABEL, NF_SITE_ID_LABEL},
    nfdeploy::{deployment::EdgeEvent, status::NfCondition, NfType},
    utils::{Clock, Context},
};

/// API group of the edge NF deployments.
pub const WORKLOAD_GROUP: &str = "workload.nephio.org";
/// API version of the edge NF deployments.
pub const WORKLOAD_VERSION: &str = "v1alpha1";

/// Reason reported on every NfDeploy when the edge watch fails.
pub const EDGE_CONNECTION_FAILURE: &str = "EdgeConnectionFailure";

fn kind(nf_type: NfType) -> Option<&'static str> {
    match nf_type {
        NfType::Upf => Some("UPFDeployment"),
        NfType::Smf => Some("SMFDeployment"),
        NfType::Amf => None,
    }
}

/// Build an edge event from a labelled edge NF deployment.
///
/// Returns `None` if the object lacks the NfDeploy or site labels.
pub fn to_edge_event(
    obj: &DynamicObject,
    nf_type: NfType,
    timestamp: DateTime<Utc>,
) -> Option<EdgeEvent> {
    let labels = obj.labels();
    let nf_deploy = labels.get(NF_DEPLOY_LABEL)?;
    let site_id = labels.get(NF_SITE_ID_LABEL)?;
    let conditions = obj
        .data
        .get("status")
        .and_then(|status| status.get("conditions"))
        .cloned()
        .map(serde_json::from_value::<Vec<NfCondition>>)
        .transpose()
        .unwrap_or_else(|err| {
            warn!(?err, name = %obj.name_any(), "invalid conditions on edge deployment");
            None
        })
        .unwrap_or_default();
    Some(EdgeEvent {
        nf_deploy: nf_deploy.clone(),
        site_id: site_id.clone(),
        nf_type,
        conditions,
        timestamp,
    })
}

/// Watch the edge NF deployments and feed their status to the deployment manager until the
/// watch streams end.
pub async fn watch<G, C>(cx: Arc<Context<G, C>>)
where
    C: Clock,
{
    let watches = [NfType::Upf, NfType::Smf].into_iter().filter_map(|nf_type| {
        let gvk = GroupVersionKind::gvk(WORKLOAD_GROUP, WORKLOAD_VERSION, kind(nf_type)?);
        let api: Api<DynamicObject> =
            Api::all_with(cx.k_client.clone(), &ApiResource::from_gvk(&gvk));
        Some(
            watcher(api, watcher::Config::default().labels(NF_DEPLOY_LABEL))
                .default_backoff()
                .map(move |event| (nf_type, event))
                .boxed(),
        )
    });
    let mut events = stream::select_all(watches);

    while let Some((nf_type, event)) = events.next().await {
        handle_event(&cx, nf_type, event).await;
    }
    warn!("edge watch ended");
}

async fn handle_event<G, C>(
    cx: &Context<G, C>,
    nf_type: NfType,
    event: Result<watcher::Event<DynamicObject>, watcher::Error>,
) where
    C: Clock,
{
    let objects = match event {
        Ok(watcher::Event::Applied(obj)) => vec![obj],
        Ok(watcher::Event::Restarted(objs)) => objs,
        Ok(watcher::Event::Deleted(obj)) => {
            debug!(name = %obj.name_any(), %nf_type, "edge deployment deleted");
            if let Some(event) = to_edge_event(&obj, nf_type, cx.clock.now()) {
                cx.deployments
                    .report_edge_delete_event(&event.nf_deploy, &event.site_id)
                    .await;
            }
            return;
        }
        Err(err) => {
            warn!(?err, %nf_type, "edge watch failed");
            if let Err(err) = cx
                .deployments
                .report_edge_failure(
                    cx.k_client.clone(),
                    cx.clock.now(),
                    EDGE_CONNECTION_FAILURE,
                    &err.to_string(),
                )
                .await
            {
                error!(?err, "cannot report edge failure");
            }
            return;
        }
    };
    for obj in objects {
        let Some(event) = to_edge_event(&obj, nf_type, cx.clock.now()) else {
            debug!(name = %obj.name_any(), "edge deployment is not part of an NfDeploy");
            continue;
        };
        if let Err(err) = cx
            .deployments
            .process_edge_event(cx.k_client.clone(), cx.clock.now(), event)
            .await
        {
            error!(?err, name = %obj.name_any(), "cannot write nfdeploy status");
        }
    }
}
