//! Utils is shared functions and constants for the controller

use std::{fmt::Debug, time::Duration};

use k8s_openapi::{
    api::core::v1::Secret,
    chrono::{DateTime, Utc},
};
use kube::{
    api::{DeleteParams, Patch, PatchParams},
    client::Client,
    Api, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{labels::managed_labels, nfdeploy::DeploymentManager, CONTROLLER_NAME};

/// Settings shared by the controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace of the git secret.
    pub git_namespace: String,
    /// Name of the secret holding the gitea admin credentials.
    pub git_secret_name: String,
    /// How long to wait before checking a package revision for approval again.
    pub approval_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            git_namespace: "default".to_owned(),
            git_secret_name: "git-user-secret".to_owned(),
            approval_requeue: Duration::from_secs(15),
        }
    }
}

/// Operator Context
pub struct Context<G, C> {
    /// Kube client
    pub k_client: Client,
    /// Gitea client
    pub gitea: G,
    /// Clock that provide the current time
    pub clock: C,
    /// Topology and status of the tracked NfDeploys
    pub deployments: DeploymentManager,
    pub config: ControllerConfig,
}

impl<G> Context<G, UtcClock> {
    /// Create new context
    pub fn new(k_client: Client, gitea: G, config: ControllerConfig) -> Self {
        Context {
            k_client,
            gitea,
            clock: UtcClock,
            deployments: DeploymentManager::default(),
            config,
        }
    }
}

/// Provides the current time.
pub trait Clock {
    /// Report the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Provides the current time using real time.
pub struct UtcClock;
impl Clock for UtcClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Add a finalizer to the object unless it is already present.
pub async fn add_finalizer<K>(api: &Api<K>, obj: &K, finalizer: &str) -> Result<(), kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    if obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_owned());
    patch_finalizers(api, obj, finalizers).await
}

/// Remove a finalizer from the object if present.
pub async fn remove_finalizer<K>(
    api: &Api<K>,
    obj: &K,
    finalizer: &str,
) -> Result<(), kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    if !obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    patch_finalizers(api, obj, finalizers).await
}

async fn patch_finalizers<K>(
    api: &Api<K>,
    obj: &K,
    finalizers: Vec<String>,
) -> Result<(), kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    // The resource version guards against overwriting finalizers added concurrently.
    let patch = json!({
        "metadata": {
            "resourceVersion": obj.resource_version(),
            "finalizers": finalizers,
        }
    });
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Apply a secret in namespace with the default managed labels
pub async fn apply_secret(
    k_client: Client,
    ns: &str,
    name: &str,
    secret: Secret,
) -> Result<Secret, kube::error::Error> {
    let serverside = PatchParams::apply(CONTROLLER_NAME);
    let secrets: Api<Secret> = Api::namespaced(k_client, ns);

    let mut secret = secret;
    secret.metadata.name = Some(name.to_owned());
    secret.metadata.namespace = Some(ns.to_owned());
    secret.metadata.labels = managed_labels();
    secrets
        .patch(name, &serverside, &Patch::Apply(secret))
        .await
}

/// Delete a secret in namespace
pub async fn delete_secret(k_client: Client, ns: &str, name: &str) -> Result<(), kube::Error> {
    let secrets: Api<Secret> = Api::namespaced(k_client, ns);

    match secrets.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.reason == "NotFound" => Ok(()),
        Err(e) => Err(e),
    }
}
