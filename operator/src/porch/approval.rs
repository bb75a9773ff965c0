//! Approves package revisions once their readiness gates and the approval policy are met.
//!
//! Revisions opt in with the `approval.nephio.org/policy` annotation. An optional
//! `approval.nephio.org/delay` annotation holds back approval until the revision is old enough.
use std::{sync::Arc, time::Duration};

use futures::stream::StreamExt;
use k8s_openapi::chrono::{DateTime, Utc};
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    runtime::{
        controller::Action,
        events::{Event, EventType, Recorder, Reporter},
        watcher::Config,
        Controller,
    },
    Api, Resource, ResourceExt,
};
use opentelemetry::{global, KeyValue};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    conditions::{ConditionStatus, READY},
    gitea::GiteaClient,
    porch::{conditions::is_ready, PackageRevision, PackageRevisionLifecycle, PackageVariant},
    utils::{Clock, Context},
};

/// Annotation holding the approval delay as a duration, e.g. `2m`.
pub const DELAY_ANNOTATION: &str = "approval.nephio.org/delay";
/// Annotation holding the approval policy.
pub const POLICY_ANNOTATION: &str = "approval.nephio.org/policy";
/// Approve only the first published revision of a package.
pub const INITIAL_POLICY: &str = "initial";

const REPORTER: &str = "approval-controller";

/// Handle errors during reconciliation.
fn on_error(
    _revision: Arc<PackageRevision>,
    _error: &Error,
    _context: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Action {
    Action::requeue(Duration::from_secs(5))
}

/// Errors produced by the reconcile function.
#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Kube error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },
    #[error("Serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// Start a controller approving PackageRevisions.
pub async fn run(
    cx: Arc<
        Context<impl GiteaClient + Send + Sync + 'static, impl Clock + Send + Sync + 'static>,
    >,
) {
    let revisions: Api<PackageRevision> = Api::all(cx.k_client.clone());

    Controller::new(revisions, Config::default())
        .run(reconcile, on_error, cx)
        .for_each(|rec_res| async move {
            match rec_res {
                Ok((revision, _)) => {
                    info!(revision.name, "reconcile success");
                }
                Err(err) => {
                    error!(?err, "reconcile error")
                }
            }
        })
        .await;
}

/// Perform a reconcile pass for a PackageRevision
async fn reconcile(
    revision: Arc<PackageRevision>,
    cx: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Result<Action, Error> {
    let meter = global::meter("nephio");
    let runs = meter
        .u64_counter("approval_reconcile_count")
        .with_description("Number of package revision approval reconciles")
        .init();

    match reconcile_(revision, cx).await {
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
    revision: Arc<PackageRevision>,
    cx: Arc<Context<impl GiteaClient, impl Clock>>,
) -> Result<Action, Error> {
    let Some(policy) = should_process(&revision) else {
        return Ok(Action::await_change());
    };
    let name = revision.name_any();
    let ns = revision.namespace().unwrap_or_default();
    let requeue = Action::requeue(cx.config.approval_requeue);
    let events = Events::new(&cx, &revision);

    // An owning PackageVariant that is not Ready may not have set the readiness gates yet.
    match package_variant_ready(&cx, &revision).await {
        Ok(true) => {}
        Ok(false) => {
            events
                .normal("NotApproved", "owning PackageVariant not Ready")
                .await;
            return Ok(requeue);
        }
        Err(err) => {
            events
                .warning(
                    "Error",
                    format!("could not get owning PackageVariant: {err}"),
                )
                .await;
            return Ok(Action::await_change());
        }
    }

    let status = revision.status.clone().unwrap_or_default();
    if !is_ready(&revision.spec.readiness_gates, &status.conditions) {
        events.normal("NotApproved", "readiness gates not met").await;
        return Ok(requeue);
    }

    let approve = match policy.as_str() {
        INITIAL_POLICY => policy_initial(&cx, &revision).await,
        _ => {
            events
                .warning(
                    "InvalidPolicy",
                    format!("invalid {POLICY_ANNOTATION:?} annotation value: {policy:?}"),
                )
                .await;
            return Ok(Action::await_change());
        }
    };
    match approve {
        Ok(true) => {}
        Ok(false) => {
            events
                .normal("NotApproved", format!("approval policy {policy:?} not met"))
                .await;
            return Ok(requeue);
        }
        Err(err) => {
            events
                .warning(
                    "Error",
                    format!("error evaluating approval policy {policy:?}: {err}"),
                )
                .await;
            return Ok(Action::await_change());
        }
    }

    match remaining_delay(&revision, cx.clock.now()) {
        Ok(None) => {}
        Ok(Some(delay)) => {
            events.normal("NotApproved", "delay time not met").await;
            return Ok(Action::requeue(delay));
        }
        Err(err) => {
            // A bad annotation is a user error, retrying will not fix it.
            events
                .warning("Error", format!("error processing {DELAY_ANNOTATION:?}: {err}"))
                .await;
            return Ok(Action::await_change());
        }
    }

    let revisions: Api<PackageRevision> = Api::namespaced(cx.k_client.clone(), &ns);
    let (action, reason, result) = if revision.spec.lifecycle == PackageRevisionLifecycle::Draft {
        let patch = json!({
            "metadata": { "resourceVersion": revision.resource_version() },
            "spec": { "lifecycle": PackageRevisionLifecycle::Proposed },
        });
        let result = revisions
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await;
        ("proposing", "Proposed", result)
    } else {
        let mut approved = revision.as_ref().clone();
        approved.spec.lifecycle = PackageRevisionLifecycle::Published;
        let result = revisions
            .replace_subresource(
                "approval",
                &name,
                &PostParams::default(),
                serde_json::to_vec(&approved)?,
            )
            .await;
        ("approving", "Approved", result)
    };

    match result {
        Ok(_) => {
            info!(%name, %reason, "package revision approval");
            events.normal(reason, "all approval policies met").await;
            Ok(Action::await_change())
        }
        Err(err) => {
            events
                .warning("Error", format!("error {action}: {err}"))
                .await;
            Err(err.into())
        }
    }
}

/// Policy of a revision that is not published yet and carries the policy annotation.
fn should_process(revision: &PackageRevision) -> Option<String> {
    if revision.spec.lifecycle.is_published() {
        return None;
    }
    revision.annotations().get(POLICY_ANNOTATION).cloned()
}

/// Reports whether the PackageVariants controlling the revision are Ready.
/// A revision without such an owner is considered Ready.
async fn package_variant_ready(
    cx: &Context<impl GiteaClient, impl Clock>,
    revision: &PackageRevision,
) -> Result<bool, kube::Error> {
    let api_version = PackageVariant::api_version(&());
    let kind = PackageVariant::kind(&());
    let variants: Api<PackageVariant> =
        Api::namespaced(cx.k_client.clone(), &revision.namespace().unwrap_or_default());

    let mut owned = false;
    for owner in revision.owner_references() {
        if owner.controller != Some(true) || owner.api_version != api_version || owner.kind != kind
        {
            continue;
        }
        owned = true;
        let variant = variants.get(&owner.name).await?;
        let ready = variant
            .status
            .iter()
            .flat_map(|status| status.conditions.iter())
            .find(|c| c.type_ == READY);
        if let Some(ready) = ready {
            return Ok(ready.status == ConditionStatus::True);
        }
    }
    Ok(!owned)
}

/// Approve unless a revision of the same package is already published.
async fn policy_initial(
    cx: &Context<impl GiteaClient, impl Clock>,
    revision: &PackageRevision,
) -> Result<bool, kube::Error> {
    let revisions: Api<PackageRevision> =
        Api::namespaced(cx.k_client.clone(), &revision.namespace().unwrap_or_default());
    let published = revisions
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter(|other| other.spec.lifecycle.is_published())
        .any(|other| {
            other.spec.repository == revision.spec.repository
                && other.spec.package_name == revision.spec.package_name
        });
    debug!(name = revision.name_any(), published, "initial policy");
    Ok(!published)
}

/// Time left before the revision may be approved, if any.
fn remaining_delay(
    revision: &PackageRevision,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Duration>> {
    let Some(delay) = revision.annotations().get(DELAY_ANNOTATION) else {
        return Ok(None);
    };
    let delay = humantime::parse_duration(delay)?;
    let created = revision
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or(now);
    let age = (now - created).to_std().unwrap_or_default();
    if age > delay {
        Ok(None)
    } else {
        Ok(Some(delay - age))
    }
}

/// Publishes events about a package revision.
struct Events {
    recorder: Recorder,
}

impl Events {
    fn new(cx: &Context<impl GiteaClient, impl Clock>, revision: &PackageRevision) -> Self {
        let reporter = Reporter {
            controller: REPORTER.to_owned(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(cx.k_client.clone(), reporter, revision.object_ref(&())),
        }
    }

    async fn normal(&self, reason: &str, note: impl Into<String>) {
        self.publish(EventType::Normal, reason, note.into()).await
    }

    async fn warning(&self, reason: &str, note: impl Into<String>) {
        self.publish(EventType::Warning, reason, note.into()).await
    }

    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.to_owned(),
            note: Some(note),
            action: "Approval".to_owned(),
            secondary: None,
        };
        if let Err(err) = self.recorder.publish(event).await {
            warn!(?err, reason, "cannot publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use k8s_openapi::{
        apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time},
        chrono::Duration as ChronoDuration,
    };
    use serde_json::Value;

    use crate::{
        conditions::Condition,
        gitea::tests::MockGiteaClientTest,
        porch::{
            PackageRevisionSpec, PackageRevisionStatus, PackageVariantSpec, PackageVariantStatus,
            ReadinessGate,
        },
        utils::test::{test_now, timeout_after_1s, ApiServerVerifier},
    };

    const EVENTS_PATH: &str = "/apis/events.k8s.io/v1/namespaces/default/events";
    const REVISIONS_PATH: &str = "/apis/porch.kpt.dev/v1alpha1/namespaces/default/packagerevisions";
    const REVISION_PATH: &str =
        "/apis/porch.kpt.dev/v1alpha1/namespaces/default/packagerevisions/mgmt-free5gc-v1";
    const VARIANT_PATH: &str =
        "/apis/config.porch.kpt.dev/v1alpha1/namespaces/default/packagevariants/free5gc-edge01";

    fn revision(lifecycle: PackageRevisionLifecycle, policy: Option<&str>) -> PackageRevision {
        let annotations = policy
            .map(|policy| BTreeMap::from([(POLICY_ANNOTATION.to_owned(), policy.to_owned())]));
        PackageRevision {
            metadata: ObjectMeta {
                name: Some("mgmt-free5gc-v1".to_owned()),
                namespace: Some("default".to_owned()),
                resource_version: Some("7".to_owned()),
                creation_timestamp: Some(Time(test_now() - ChronoDuration::hours(1))),
                annotations,
                ..Default::default()
            },
            spec: PackageRevisionSpec {
                package_name: "free5gc".to_owned(),
                repository: "edge01".to_owned(),
                workspace_name: "v1".to_owned(),
                lifecycle,
                readiness_gates: vec![ReadinessGate {
                    condition_type: "nephio.org.Specializer.specialize".to_owned(),
                }],
                ..Default::default()
            },
            status: Some(PackageRevisionStatus {
                conditions: vec![Condition {
                    type_: "nephio.org.Specializer.specialize".to_owned(),
                    status: ConditionStatus::True,
                    ..Default::default()
                }],
            }),
        }
    }

    fn draft() -> PackageRevision {
        revision(PackageRevisionLifecycle::Draft, Some(INITIAL_POLICY))
    }

    fn revision_list(items: Vec<PackageRevision>) -> Value {
        json!({
            "apiVersion": "porch.kpt.dev/v1alpha1",
            "kind": "PackageRevisionList",
            "metadata": {},
            "items": items,
        })
    }

    fn variant(ready: ConditionStatus) -> PackageVariant {
        PackageVariant {
            metadata: ObjectMeta {
                name: Some("free5gc-edge01".to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            spec: PackageVariantSpec::default(),
            status: Some(PackageVariantStatus {
                conditions: vec![Condition {
                    type_: READY.to_owned(),
                    status: ready,
                    ..Default::default()
                }],
            }),
        }
    }

    fn owned_by_variant(mut revision: PackageRevision) -> PackageRevision {
        revision.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "config.porch.kpt.dev/v1alpha1".to_owned(),
            kind: "PackageVariant".to_owned(),
            name: "free5gc-edge01".to_owned(),
            uid: "8c5bcb0e-0b4e-4ad5-8c51-1a9d2b4c5f6a".to_owned(),
            controller: Some(true),
            ..Default::default()
        }]);
        revision
    }

    async fn expect_event(fakeserver: &mut ApiServerVerifier, type_: &str, reason: &str) -> Value {
        let request = fakeserver.handle_echo("POST", EVENTS_PATH).await;
        assert_eq!(request.body["type"], type_);
        assert_eq!(request.body["reason"], reason);
        assert_eq!(request.body["regarding"]["name"], "mgmt-free5gc-v1");
        request.body
    }

    #[tokio::test]
    async fn skips_published_revision() {
        let (testctx, fakeserver) = Context::test(MockGiteaClientTest::new());
        let published = revision(PackageRevisionLifecycle::Published, Some(INITIAL_POLICY));
        let action = reconcile(Arc::new(published), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::await_change());
        drop(fakeserver);
    }

    #[tokio::test]
    async fn skips_revision_without_policy() {
        let (testctx, fakeserver) = Context::test(MockGiteaClientTest::new());
        let action = reconcile(
            Arc::new(revision(PackageRevisionLifecycle::Draft, None)),
            testctx,
        )
        .await
        .expect("reconciler");
        assert_eq!(action, Action::await_change());
        drop(fakeserver);
    }

    #[tokio::test]
    async fn proposes_draft() {
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", REVISIONS_PATH, Some(&revision_list(vec![])))
                .await;
            let request = fakeserver
                .handle_request_response("PATCH", REVISION_PATH, Some(&draft()))
                .await;
            assert_eq!(
                request.body,
                json!({
                    "metadata": { "resourceVersion": "7" },
                    "spec": { "lifecycle": "Proposed" },
                })
            );
            let event = expect_event(&mut fakeserver, "Normal", "Proposed").await;
            assert_eq!(event["note"], "all approval policies met");
        });
        let action = reconcile(Arc::new(draft()), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::await_change());
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn approves_proposed() {
        let proposed = revision(PackageRevisionLifecycle::Proposed, Some(INITIAL_POLICY));
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", REVISIONS_PATH, Some(&revision_list(vec![])))
                .await;
            let request = fakeserver
                .handle_echo("PUT", &format!("{REVISION_PATH}/approval"))
                .await;
            assert_eq!(request.body["spec"]["lifecycle"], "Published");
            expect_event(&mut fakeserver, "Normal", "Approved").await;
        });
        reconcile(Arc::new(proposed), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn initial_policy_not_met() {
        let mut other = revision(PackageRevisionLifecycle::Published, Some(INITIAL_POLICY));
        other.metadata.name = Some("mgmt-free5gc-v0".to_owned());
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response(
                    "GET",
                    REVISIONS_PATH,
                    Some(&revision_list(vec![other, draft()])),
                )
                .await;
            let event = expect_event(&mut fakeserver, "Normal", "NotApproved").await;
            assert_eq!(event["note"], "approval policy \"initial\" not met");
        });
        let action = reconcile(Arc::new(draft()), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::requeue(Duration::from_secs(15)));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn readiness_gates_not_met() {
        let mut pending = draft();
        pending.status = None;
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            let event = expect_event(&mut fakeserver, "Normal", "NotApproved").await;
            assert_eq!(event["note"], "readiness gates not met");
        });
        let action = reconcile(Arc::new(pending), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::requeue(Duration::from_secs(15)));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn package_variant_not_ready() {
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response(
                    "GET",
                    VARIANT_PATH,
                    Some(&variant(ConditionStatus::False)),
                )
                .await;
            let event = expect_event(&mut fakeserver, "Normal", "NotApproved").await;
            assert_eq!(event["note"], "owning PackageVariant not Ready");
        });
        let action = reconcile(Arc::new(owned_by_variant(draft())), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::requeue(Duration::from_secs(15)));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn package_variant_ready_proposes() {
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", VARIANT_PATH, Some(&variant(ConditionStatus::True)))
                .await;
            fakeserver
                .handle_request_response("GET", REVISIONS_PATH, Some(&revision_list(vec![])))
                .await;
            fakeserver
                .handle_request_response("PATCH", REVISION_PATH, Some(&draft()))
                .await;
            expect_event(&mut fakeserver, "Normal", "Proposed").await;
        });
        reconcile(Arc::new(owned_by_variant(draft())), testctx)
            .await
            .expect("reconciler");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn invalid_policy() {
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            let event = expect_event(&mut fakeserver, "Warning", "InvalidPolicy").await;
            assert_eq!(
                event["note"],
                "invalid \"approval.nephio.org/policy\" annotation value: \"always\""
            );
        });
        let action = reconcile(
            Arc::new(revision(PackageRevisionLifecycle::Draft, Some("always"))),
            testctx,
        )
        .await
        .expect("reconciler");
        assert_eq!(action, Action::await_change());
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn delay_not_met() {
        let mut delayed = draft();
        delayed
            .annotations_mut()
            .insert(DELAY_ANNOTATION.to_owned(), "2h".to_owned());
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", REVISIONS_PATH, Some(&revision_list(vec![])))
                .await;
            let event = expect_event(&mut fakeserver, "Normal", "NotApproved").await;
            assert_eq!(event["note"], "delay time not met");
        });
        let action = reconcile(Arc::new(delayed), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::requeue(Duration::from_secs(3600)));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn invalid_delay() {
        let mut delayed = draft();
        delayed
            .annotations_mut()
            .insert(DELAY_ANNOTATION.to_owned(), "soon".to_owned());
        let (testctx, mut fakeserver) = Context::test(MockGiteaClientTest::new());
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .handle_request_response("GET", REVISIONS_PATH, Some(&revision_list(vec![])))
                .await;
            expect_event(&mut fakeserver, "Warning", "Error").await;
        });
        let action = reconcile(Arc::new(delayed), testctx)
            .await
            .expect("reconciler");
        assert_eq!(action, Action::await_change());
        timeout_after_1s(mocksrv).await;
    }

    #[test]
    fn elapsed_delay() {
        let mut delayed = draft();
        delayed
            .annotations_mut()
            .insert(DELAY_ANNOTATION.to_owned(), "30m".to_owned());
        assert_eq!(remaining_delay(&delayed, test_now()).unwrap(), None);
        assert_eq!(remaining_delay(&draft(), test_now()).unwrap(), None);
    }
}
