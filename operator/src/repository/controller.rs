use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use futures::stream::StreamExt;
use kube::{
    api::{Patch, PatchParams},
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Resource, ResourceExt,
};
use opentelemetry::{global, KeyValue};
use serde_json::json;
use tracing::{debug, error, info};

use crate::{
    conditions::{set_condition, Condition},
    gitea::{CreateRepoOption, EditRepoOption, GiteaClient},
    lifecycle::{DeletionPolicy, INFRA_FINALIZER},
    repository::{Repository, RepositoryStatus},
    utils::{add_finalizer, remove_finalizer, Clock, Context},
};

/// Handle errors during reconciliation.
fn on_error(
    _repository: Arc<Repository>,
    _error: &Error,
    _context: Arc<Context<impl GiteaClient, impl Clock>>,
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
}

/// Start a controller for the Repository CRD.
pub async fn run(
    cx: Arc<
        Context<impl GiteaClient + Send + Sync + 'static, impl Clock + Send + Sync + 'static>,
    >,
) {
    let repositories: Api<Repository> = Api::all(cx.k_client.clone());

    Controller::new(repositories, Config::default())
        .run(reconcile, on_error, cx)
        .for_each(|rec_res| async move {
            match rec_res {
                Ok((repository, _)) => {
                    info!(repository.name, "reconcile success");
                }
                Err(err) => {
                    error!(?err, "reconcile error")
                }
            }
        })
        .await;
}

/// Perform a reconcile pass for the Repository CRD
async fn reconcile(
    repository: Arc<Repository>,
    cx: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Result<Action, Error> {
    let meter = global::meter("nephio");
    let runs = meter
        .u64_counter("repository_reconcile_count")
        .with_description("Number of repository reconciles")
        .init();

    match reconcile_(repository, cx).await {
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
    repository: Arc<Repository>,
    cx: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Result<Action, Error> {
    let name = repository.name_any();
    let ns = repository.namespace().unwrap_or_default();
    let repositories: Api<Repository> = Api::namespaced(cx.k_client.clone(), &ns);
    let mut status = repository.status.clone().unwrap_or_default();

    if !cx.gitea.is_initialized().await {
        error!(%name, "cannot connect to git server");
        set_condition(
            &mut status.conditions,
            Condition::failed("gitea server unreachable"),
            cx.clock.now(),
        );
        patch_status(&repositories, &name, &status).await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    if repository.meta().deletion_timestamp.is_some() {
        if repository.spec.lifecycle.deletion_policy == DeletionPolicy::Delete {
            if let Err(err) = delete_repo(&cx.gitea, &name).await {
                error!(?err, %name, "cannot delete repo in git server");
                set_condition(
                    &mut status.conditions,
                    Condition::failed(err.to_string()),
                    cx.clock.now(),
                );
                patch_status(&repositories, &name, &status).await?;
                return Ok(Action::requeue(Duration::from_secs(5)));
            }
        }
        remove_finalizer(&repositories, repository.as_ref(), INFRA_FINALIZER).await?;
        info!(%name, "repository deleted");
        return Ok(Action::await_change());
    }

    add_finalizer(&repositories, repository.as_ref(), INFRA_FINALIZER).await?;

    let action = match upsert_repo(&cx.gitea, &repository).await {
        Ok(url) => {
            status.url = Some(url);
            set_condition(&mut status.conditions, Condition::ready(), cx.clock.now());
            Action::await_change()
        }
        Err(err) => {
            set_condition(
                &mut status.conditions,
                Condition::failed(err.to_string()),
                cx.clock.now(),
            );
            Action::requeue(Duration::from_secs(5))
        }
    };
    patch_status(&repositories, &name, &status).await?;
    Ok(action)
}

async fn patch_status(
    repositories: &Api<Repository>,
    name: &str,
    status: &RepositoryStatus,
) -> Result<(), kube::Error> {
    repositories
        .patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await?;
    Ok(())
}

/// Create the repository or update it in place, returning its clone url.
///
/// Create and update failures are reported without the server message since it changes on
/// every attempt.
async fn upsert_repo(gitea: &impl GiteaClient, repository: &Repository) -> anyhow::Result<String> {
    let name = repository.name_any();
    let user = gitea.get_my_user_info().await.map_err(|err| {
        error!(?err, "cannot get user info");
        err
    })?;
    let spec = &repository.spec;

    let repo = match gitea.get_repo(&user.login, &name).await? {
        None => {
            let option = CreateRepoOption {
                name: name.clone(),
                description: spec.description.clone().unwrap_or_default(),
                private: spec.private.unwrap_or_default(),
                issue_labels: spec.issue_labels.clone().unwrap_or_default(),
                gitignores: spec.gitignores.clone().unwrap_or_default(),
                license: spec.license.clone().unwrap_or_default(),
                readme: spec.readme.clone().unwrap_or_default(),
                default_branch: spec.default_branch.clone().unwrap_or_default(),
                trust_model: spec.trust_model.clone(),
                auto_init: true,
            };
            debug!(?option, "creating repo");
            let repo = gitea.create_repo(option).await.map_err(|err| {
                error!(?err, %name, "cannot create repo");
                anyhow!("cannot create repo")
            })?;
            info!(%name, "repo created");
            repo
        }
        Some(_) => {
            let option = EditRepoOption {
                name: Some(name.clone()),
                description: spec.description.clone(),
                private: spec.private,
            };
            let repo = gitea
                .edit_repo(&user.login, &name, option)
                .await
                .map_err(|err| {
                    error!(?err, %name, "cannot update repo");
                    anyhow!("cannot update repo")
                })?;
            info!(%name, "repo updated");
            repo
        }
    };
    Ok(repo.clone_url)
}

async fn delete_repo(gitea: &impl GiteaClient, name: &str) -> anyhow::Result<()> {
    let user = gitea.get_my_user_info().await?;
    gitea.delete_repo(&user.login, name).await?;
    info!(name, "repo deleted");
    Ok(())
}
