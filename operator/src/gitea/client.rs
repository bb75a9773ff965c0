use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{error, info};

use crate::gitea::{
    AccessToken, CreateAccessTokenOption, CreateRepoOption, Credentials, EditRepoOption,
    GiteaClient, Repo, User,
};

/// Interval between attempts to load the git secret.
const CONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

/// Gitea client over HTTP with basic auth.
///
/// The client is unusable until [`HttpGiteaClient::connect`] has loaded the credentials
/// from the git secret.
#[derive(Clone)]
pub struct HttpGiteaClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Arc<RwLock<Option<Credentials>>>,
}

impl HttpGiteaClient {
    /// Create a client for the gitea server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
            credentials: Arc::new(RwLock::new(None)),
        }
    }

    /// Load credentials from the git secret in the background, retrying until the secret exists.
    pub fn connect(&self, k_client: Client, namespace: &str, secret_name: &str) -> JoinHandle<()> {
        let secrets: Api<Secret> = Api::namespaced(k_client, namespace);
        let secret_name = secret_name.to_owned();
        let credentials = self.credentials.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CONNECT_INTERVAL).await;
                let secret = match secrets.get(&secret_name).await {
                    Ok(secret) => secret,
                    Err(err) => {
                        error!(?err, %secret_name, "cannot get git secret");
                        continue;
                    }
                };
                match Credentials::from_secret(&secret) {
                    Ok(loaded) => {
                        info!(username = %loaded.username, "gitea init done");
                        *credentials.write().await = Some(loaded);
                        return;
                    }
                    Err(err) => error!(?err, %secret_name, "invalid git secret"),
                }
            }
        })
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let credentials = self
            .credentials
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("gitea server unreachable"))?;
        Ok(self
            .http
            .request(method, format!("{}/api/v1{}", self.base_url, path))
            .basic_auth(&credentials.username, Some(&credentials.password)))
    }

    async fn username(&self) -> Result<String> {
        self.credentials
            .read()
            .await
            .as_ref()
            .map(|c| c.username.clone())
            .ok_or_else(|| anyhow!("gitea server unreachable"))
    }
}

/// Turn unsuccessful responses into errors carrying the server message.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .json::<ErrorResponse>()
        .await
        .map(|err| err.message)
        .unwrap_or_default();
    bail!("gitea request failed with {status}: {message}")
}

#[async_trait]
impl GiteaClient for HttpGiteaClient {
    async fn is_initialized(&self) -> bool {
        self.credentials.read().await.is_some()
    }

    async fn get_my_user_info(&self) -> Result<User> {
        let req = self.request(Method::GET, "/user").await?;
        Ok(check(req.send().await?).await?.json().await?)
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Option<Repo>> {
        let req = self
            .request(Method::GET, &format!("/repos/{owner}/{repo}"))
            .await?;
        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(resp).await?.json().await?))
    }

    async fn create_repo(&self, option: CreateRepoOption) -> Result<Repo> {
        let req = self.request(Method::POST, "/user/repos").await?;
        Ok(check(req.json(&option).send().await?).await?.json().await?)
    }

    async fn edit_repo(&self, owner: &str, repo: &str, option: EditRepoOption) -> Result<Repo> {
        let req = self
            .request(Method::PATCH, &format!("/repos/{owner}/{repo}"))
            .await?;
        Ok(check(req.json(&option).send().await?).await?.json().await?)
    }

    async fn delete_repo(&self, owner: &str, repo: &str) -> Result<()> {
        let req = self
            .request(Method::DELETE, &format!("/repos/{owner}/{repo}"))
            .await?;
        check(req.send().await?).await?;
        Ok(())
    }

    async fn list_access_tokens(&self) -> Result<Vec<AccessToken>> {
        let username = self.username().await?;
        let req = self
            .request(Method::GET, &format!("/users/{username}/tokens"))
            .await?;
        Ok(check(req.send().await?).await?.json().await?)
    }

    async fn create_access_token(&self, option: CreateAccessTokenOption) -> Result<AccessToken> {
        let username = self.username().await?;
        let req = self
            .request(Method::POST, &format!("/users/{username}/tokens"))
            .await?;
        Ok(check(req.json(&option).send().await?).await?.json().await?)
    }

    async fn delete_access_token(&self, name: &str) -> Result<()> {
        let username = self.username().await?;
        let req = self
            .request(Method::DELETE, &format!("/users/{username}/tokens/{name}"))
            .await?;
        check(req.send().await?).await?;
        Ok(())
    }
}
