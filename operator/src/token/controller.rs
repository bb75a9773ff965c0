use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Context as _;
use futures::stream::StreamExt;
use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::{
    api::{Patch, PatchParams},
    core::ObjectMeta,
    runtime::{
        controller::Action,
        watcher::{self, Config},
        Controller,
    },
    Api, Resource, ResourceExt,
};
use opentelemetry::{global, KeyValue};
use serde_json::json;
use tracing::{debug, error, info};

use crate::{
    conditions::{set_condition, Condition},
    gitea::{CreateAccessTokenOption, GiteaClient},
    labels::MANAGED_BY_LABEL_SELECTOR,
    lifecycle::INFRA_FINALIZER,
    token::{Token, TokenStatus},
    utils::{add_finalizer, apply_secret, delete_secret, remove_finalizer, Clock, Context},
};

/// Type of the secret holding the token.
const BASIC_AUTH_SECRET_TYPE: &str = "kubernetes.io/basic-auth";

/// Handle errors during reconciliation.
fn on_error(
    _token: Arc<Token>,
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

/// Start a controller for the Token CRD.
pub async fn run(
    cx: Arc<
        Context<impl GiteaClient + Send + Sync + 'static, impl Clock + Send + Sync + 'static>,
    >,
) {
    let tokens: Api<Token> = Api::all(cx.k_client.clone());
    let secrets = Api::<Secret>::all(cx.k_client.clone());

    Controller::new(tokens, Config::default())
        .owns(
            secrets,
            watcher::Config::default().labels(MANAGED_BY_LABEL_SELECTOR),
        )
        .run(reconcile, on_error, cx)
        .for_each(|rec_res| async move {
            match rec_res {
                Ok((token, _)) => {
                    info!(token.name, "reconcile success");
                }
                Err(err) => {
                    error!(?err, "reconcile error")
                }
            }
        })
        .await;
}

/// Perform a reconcile pass for the Token CRD
async fn reconcile(
    token: Arc<Token>,
    cx: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Result<Action, Error> {
    let meter = global::meter("nephio");
    let runs = meter
        .u64_counter("token_reconcile_count")
        .with_description("Number of token reconciles")
        .init();

    match reconcile_(token, cx).await {
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
    token: Arc<Token>,
    cx: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Result<Action, Error> {
    let name = token.name_any();
    let ns = token.namespace().unwrap_or_default();
    let tokens: Api<Token> = Api::namespaced(cx.k_client.clone(), &ns);
    let mut status = token.status.clone().unwrap_or_default();

    if !cx.gitea.is_initialized().await {
        error!(%name, "cannot connect to gitea server");
        set_condition(
            &mut status.conditions,
            Condition::failed("gitea server unreachable"),
            cx.clock.now(),
        );
        patch_status(&tokens, &name, &status).await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    if token.meta().deletion_timestamp.is_some() {
        if let Err(err) = delete_token(&cx, &token).await {
            error!(?err, %name, "cannot delete token");
            set_condition(
                &mut status.conditions,
                Condition::failed(err.to_string()),
                cx.clock.now(),
            );
            patch_status(&tokens, &name, &status).await?;
            return Ok(Action::requeue(Duration::from_secs(5)));
        }
        remove_finalizer(&tokens, token.as_ref(), INFRA_FINALIZER).await?;
        info!(%name, "token deleted");
        return Ok(Action::await_change());
    }

    add_finalizer(&tokens, token.as_ref(), INFRA_FINALIZER).await?;

    let action = match create_token(&cx, &token).await {
        Ok(()) => {
            set_condition(&mut status.conditions, Condition::ready(), cx.clock.now());
            Action::await_change()
        }
        Err(err) => {
            error!(?err, %name, "cannot create token");
            set_condition(
                &mut status.conditions,
                Condition::failed(err.to_string()),
                cx.clock.now(),
            );
            Action::requeue(Duration::from_secs(5))
        }
    };
    patch_status(&tokens, &name, &status).await?;
    Ok(action)
}

async fn patch_status(
    tokens: &Api<Token>,
    name: &str,
    status: &TokenStatus,
) -> Result<(), kube::Error> {
    tokens
        .patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await?;
    Ok(())
}

/// Create the gitea token and the secret exposing it, unless the token already exists.
async fn create_token(
    cx: &Context<impl GiteaClient, impl Clock>,
    token: &Token,
) -> anyhow::Result<()> {
    let git_secrets: Api<Secret> = Api::namespaced(cx.k_client.clone(), &cx.config.git_namespace);
    let git_secret = git_secrets
        .get(&cx.config.git_secret_name)
        .await
        .context("cannot get secret")?;

    let token_name = token.token_name();
    let existing = cx.gitea.list_access_tokens().await?;
    if existing.iter().any(|t| t.name == token_name) {
        debug!(%token_name, "token already exists");
        return Ok(());
    }

    let access_token = cx
        .gitea
        .create_access_token(CreateAccessTokenOption {
            name: token_name.clone(),
            ..Default::default()
        })
        .await?;
    info!(%token_name, "token created");

    let username = git_secret
        .data
        .and_then(|mut data| data.remove("username"))
        .unwrap_or_default();
    let value = ByteString(access_token.token.into_bytes());
    let secret = Secret {
        metadata: ObjectMeta {
            annotations: token.metadata.annotations.clone(),
            owner_references: token.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            ("username".to_owned(), username),
            // porch reads the password, configsync the token
            ("password".to_owned(), value.clone()),
            ("token".to_owned(), value),
        ])),
        type_: Some(BASIC_AUTH_SECRET_TYPE.to_owned()),
        ..Default::default()
    };
    let name = token.name_any();
    apply_secret(
        cx.k_client.clone(),
        &token.namespace().unwrap_or_default(),
        &name,
        secret,
    )
    .await?;
    info!(%name, "secret for token created");
    Ok(())
}

async fn delete_token(
    cx: &Context<impl GiteaClient, impl Clock>,
    token: &Token,
) -> anyhow::Result<()> {
    delete_secret(
        cx.k_client.clone(),
        &token.namespace().unwrap_or_default(),
        &token.name_any(),
    )
    .await
    .context("cannot delete access token secret")?;
    cx.gitea.delete_access_token(&token.token_name()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use mockall::predicate;
    use tracing_test::traced_test;

    use crate::{
        gitea::{
            tests::{git_secret, MockGiteaClientTest},
            AccessToken,
        },
        token::TokenSpec,
        utils::test::{test_now, timeout_after_1s},
    };

    const TOKEN_STATUS_PATH: &str =
        "/apis/infra.nephio.org/v1alpha1/namespaces/default/tokens/porch-token/status";
    const TOKEN_PATH: &str = "/apis/infra.nephio.org/v1alpha1/namespaces/default/tokens/porch-token";
    const GIT_SECRET_PATH: &str = "/api/v1/namespaces/default/secrets/git-user-secret";
    const SECRET_PATH: &str = "/api/v1/namespaces/default/secrets/porch-token";

    fn token() -> Token {
        Token {
            metadata: ObjectMeta {
                name: Some("porch-token".to_owned()),
                namespace: Some("default".to_owned()),
                resource_version: Some("1".to_owned()),
                finalizers: Some(vec![INFRA_FINALIZER.to_owned()]),
                annotations: Some(BTreeMap::from([(
                    "nephio.org/cluster-name".to_owned(),
                    "edge01".to_owned(),
                )])),
                ..Default::default()
            },
            spec: TokenSpec::default(),
            status: None,
        }
    }

    fn connected_gitea() -> MockGiteaClientTest {
        let mut gitea = MockGiteaClientTest::new();
        gitea.expect_is_initialized().return_const(true);
        gitea
    }

    #[test]
    fn token_name_includes_namespace() {
        assert_eq!(token().token_name(), "porch-token-default");
    }

    #[tokio::test]
    #[traced_test]
    async fn reconcile_creates_token_and_secret() {
        let mut gitea = connected_gitea();
        gitea
            .expect_list_access_tokens()
            .returning(|| Ok(vec![]));
        gitea
            .expect_create_access_token()
            .with(predicate::eq(CreateAccessTokenOption {
                name: "porch-token-default".to_owned(),
                ..Default::default()
            }))
            .returning(|option| {
                Ok(AccessToken {
                    name: option.name,
                    token: "abc".to_owned(),
                    ..Default::default()
                })
            });

        let (testctx, mut fakeserver) = Context::test(gitea);
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", GIT_SECRET_PATH, Some(&git_secret()))
                .await;
            let request = fakeserver.handle_echo("PATCH", SECRET_PATH).await;
            assert!(request.query.contains("fieldManager=nephio"));
            assert_eq!(request.body["type"], BASIC_AUTH_SECRET_TYPE);
            // base64 of nephio and abc
            assert_eq!(
                request.body["data"],
                json!({"username": "bmVwaGlv", "password": "YWJj", "token": "YWJj"})
            );
            assert_eq!(
                request.body["metadata"]["annotations"]["nephio.org/cluster-name"],
                "edge01"
            );
            assert_eq!(request.body["metadata"]["labels"]["managed-by"], "nephio");
            let request = fakeserver
                .handle_request_response("PATCH", TOKEN_STATUS_PATH, Some(&token()))
                .await;
            assert_eq!(request.body["status"]["conditions"][0]["status"], "True");
        });
        let action = reconcile(Arc::new(token()), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::await_change());
        timeout_after_1s(mocksrv).await;
        assert!(logs_contain("token created"));
    }

    #[tokio::test]
    #[traced_test]
    async fn reconcile_existing_token() {
        let mut gitea = connected_gitea();
        gitea.expect_list_access_tokens().returning(|| {
            Ok(vec![AccessToken {
                name: "porch-token-default".to_owned(),
                ..Default::default()
            }])
        });
        gitea.expect_create_access_token().never();

        let (testctx, mut fakeserver) = Context::test(gitea);
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", GIT_SECRET_PATH, Some(&git_secret()))
                .await;
            fakeserver
                .handle_request_response("PATCH", TOKEN_STATUS_PATH, Some(&token()))
                .await;
        });
        reconcile(Arc::new(token()), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
        assert!(logs_contain("token already exists"));
    }

    #[tokio::test]
    async fn reconcile_missing_git_secret() {
        let gitea = connected_gitea();
        let (testctx, mut fakeserver) = Context::test(gitea);
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response::<Secret>("GET", GIT_SECRET_PATH, None)
                .await;
            let request = fakeserver
                .handle_request_response("PATCH", TOKEN_STATUS_PATH, Some(&token()))
                .await;
            let condition = &request.body["status"]["conditions"][0];
            assert_eq!(condition["reason"], "Failed");
            assert_eq!(condition["message"], "cannot get secret");
        });
        let action = reconcile(Arc::new(token()), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn reconcile_delete() {
        let mut gitea = connected_gitea();
        gitea
            .expect_delete_access_token()
            .withf(|name| name == "porch-token-default")
            .times(1)
            .returning(|_| Ok(()));
        let mut deleted = token();
        deleted.metadata.deletion_timestamp = Some(Time(test_now()));

        let (testctx, mut fakeserver) = Context::test(gitea);
        let mocksrv = tokio::spawn(async move {
            // A missing secret is not an error.
            fakeserver
                .handle_request_response::<Secret>("DELETE", SECRET_PATH, None)
                .await;
            let request = fakeserver
                .handle_request_response("PATCH", TOKEN_PATH, Some(&token()))
                .await;
            assert_eq!(request.body["metadata"]["finalizers"], json!([]));
        });
        reconcile(Arc::new(deleted), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
    }
}
