//! Client for the gitea REST API, covering the repository and access token endpoints.
mod client;

pub use client::HttpGiteaClient;

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use k8s_openapi::{api::core::v1::Secret, ByteString};
use serde::{Deserialize, Serialize};

/// Define the behavior we consume from the gitea API.
#[async_trait]
pub trait GiteaClient {
    /// Reports whether credentials have been loaded.
    async fn is_initialized(&self) -> bool;
    async fn get_my_user_info(&self) -> Result<User>;
    /// Returns `None` if the repository does not exist.
    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Option<Repo>>;
    async fn create_repo(&self, option: CreateRepoOption) -> Result<Repo>;
    async fn edit_repo(&self, owner: &str, repo: &str, option: EditRepoOption) -> Result<Repo>;
    async fn delete_repo(&self, owner: &str, repo: &str) -> Result<()>;
    /// Access tokens of the authenticated user.
    async fn list_access_tokens(&self) -> Result<Vec<AccessToken>>;
    async fn create_access_token(&self, option: CreateAccessTokenOption) -> Result<AccessToken>;
    async fn delete_access_token(&self, name: &str) -> Result<()>;
}

/// A gitea user.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub email: String,
}

/// A gitea repository.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Repo {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub clone_url: String,
}

/// Options to create a repository for the authenticated user.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct CreateRepoOption {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub private: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub issue_labels: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub gitignores: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub readme: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_model: Option<String>,
    pub auto_init: bool,
}

/// Options to edit a repository, unset fields are left unchanged.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct EditRepoOption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
}

/// An access token of a gitea user.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct AccessToken {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    /// Token value, only returned when the token is created.
    #[serde(default, rename = "sha1")]
    pub token: String,
}

/// Options to create an access token.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct CreateAccessTokenOption {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// Basic auth credentials of the gitea admin user.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read the `username` and `password` keys of the git secret.
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let empty = BTreeMap::new();
        let data = secret.data.as_ref().unwrap_or(&empty);
        let field = |key: &str| -> Result<String> {
            let ByteString(bytes) = data
                .get(key)
                .ok_or_else(|| anyhow!("git secret has no {key}"))?;
            Ok(String::from_utf8(bytes.clone())?)
        };
        Ok(Self {
            username: field("username")?,
            password: field("password")?,
        })
    }
}
