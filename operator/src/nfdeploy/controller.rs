use std::{sync::Arc, time::Duration};

use futures::stream::StreamExt;
use kube::{
    api::{Patch, PatchParams},
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Resource, ResourceExt,
};
use nephio_common::naming::NamingContext;
use opentelemetry::{global, KeyValue};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    conditions::ConditionStatus,
    nfdeploy::{
        edge,
        status::merge_conditions,
        validate::{validate, ValidationError},
        NfDeploy, NfDeployCondition, NfDeployConditionType, NfDeployStatus,
    },
    utils::{add_finalizer, remove_finalizer, Clock, Context},
};

/// Finalizer that keeps an NfDeploy around until it is no longer tracked.
pub const NFDEPLOY_FINALIZER: &str = "nfdeploy.nephio.org/nfdeployfinalizer";

/// Handle errors during reconciliation.
fn on_error(
    _nf_deploy: Arc<NfDeploy>,
    _error: &Error,
    _context: Arc<Context<impl Send + Sync, impl Clock>>,
) -> Action {
    Action::requeue(Duration::from_secs(5))
}

/// Errors produced by the reconcile function.
#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("App error: {source}")]
    App {
        #[from]
        source: anyhow::Error,
    },
    #[error("Kube error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },
    #[error("Invalid NfDeploy: {source}")]
    Invalid {
        #[from]
        source: ValidationError,
    },
}

/// Start a controller for the NfDeploy CRD along with the edge watcher feeding its status.
pub async fn run(
    cx: Arc<Context<impl Send + Sync + 'static, impl Clock + Send + Sync + 'static>>,
) {
    let nf_deploys: Api<NfDeploy> = Api::all(cx.k_client.clone());

    let controller = Controller::new(nf_deploys, Config::default())
        .run(reconcile, on_error, cx.clone())
        .for_each(|rec_res| async move {
            match rec_res {
                Ok((nf_deploy, _)) => {
                    info!(nf_deploy.name, "reconcile success");
                }
                Err(err) => {
                    error!(?err, "reconcile error")
                }
            }
        });
    futures::join!(controller, edge::watch(cx));
}

/// Perform a reconcile pass for the NfDeploy CRD
async fn reconcile(
    nf_deploy: Arc<NfDeploy>,
    cx: Arc<Context<impl Send + Sync, impl Clock>>,
) -> Result<Action, Error> {
    let meter = global::meter("nephio");
    let runs = meter
        .u64_counter("nfdeploy_reconcile_count")
        .with_description("Number of nfdeploy reconciles")
        .init();

    match reconcile_(nf_deploy, cx).await {
        Ok(action) => {
            runs.add(1, &[KeyValue::new("result", "ok")]);
            Ok(action)
        }
        Err(err) => {
            runs.add(1, &[KeyValue::new("result", "err")]);
            Err(err)
        }
    }
}

async fn reconcile_(
    nf_deploy: Arc<NfDeploy>,
    cx: Arc<Context<impl Send + Sync, impl Clock>>,
) -> Result<Action, Error> {
    let name = nf_deploy.name_any();
    let ns = nf_deploy.namespace().unwrap_or_default();
    let nf_deploys: Api<NfDeploy> = Api::namespaced(cx.k_client.clone(), &ns);

    if nf_deploy.meta().deletion_timestamp.is_some() {
        cx.deployments.report_nf_deploy_delete_event(&name).await;
        remove_finalizer(&nf_deploys, nf_deploy.as_ref(), NFDEPLOY_FINALIZER).await?;
        return Ok(Action::await_change());
    }

    validate(&nf_deploy)?;
    add_finalizer(&nf_deploys, nf_deploy.as_ref(), NFDEPLOY_FINALIZER).await?;

    let status = nf_deploy.status.clone().unwrap_or_default();
    let generation = nf_deploy.meta().generation;
    if status.observed_generation != generation {
        debug!(%name, ?generation, "new nfdeploy generation");
        let status = NfDeployStatus {
            observed_generation: generation,
            conditions: merge_conditions(&status.conditions, initial_conditions(), cx.clock.now()),
            ..status
        };
        nf_deploys
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": status })),
            )
            .await?;
    }

    cx.deployments
        .report_nf_deploy_event(cx.k_client.clone(), cx.clock.now(), &nf_deploy)
        .await?;

    for site in &nf_deploy.spec.sites {
        match NamingContext::new(&site.cluster_name, &name) {
            Ok(naming) => debug!(
                site = %site.id,
                package = %naming.deploy_package_name(),
                repository = %naming.deploy_repository_name(),
                "deploy package"
            ),
            Err(err) => warn!(%err, site = %site.id, "cannot name deploy package"),
        }
    }

    Ok(Action::await_change())
}

/// Conditions of an NfDeploy whose spec has not been rolled out yet.
fn initial_conditions() -> Vec<NfDeployCondition> {
    let condition = |type_, status, reason: &str, message: &str| NfDeployCondition {
        type_,
        status,
        last_update_time: None,
        last_transition_time: None,
        reason: reason.to_owned(),
        message: message.to_owned(),
    };
    vec![
        condition(NfDeployConditionType::Stalled, ConditionStatus::False, "", ""),
        condition(NfDeployConditionType::Ready, ConditionStatus::Unknown, "", ""),
        condition(NfDeployConditionType::Peering, ConditionStatus::Unknown, "", ""),
        condition(
            NfDeployConditionType::Reconciling,
            ConditionStatus::True,
            "NewVersionAvailable",
            "Reconciling NfDeploy",
        ),
    ]
}
