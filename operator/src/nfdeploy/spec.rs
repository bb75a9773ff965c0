//! Place all spec types into a single module so they can be used as a lightweight dependency
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::ConditionStatus;

/// Describes the network functions of a 5G core deployment and how they connect.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "nfdeploy.nephio.org",
    version = "v1alpha1",
    kind = "NfDeploy",
    plural = "nfdeploys",
    status = "NfDeployStatus",
    derive = "PartialEq",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyNFs"}"#,
    printcolumn = r#"{"name":"Targeted", "type":"integer", "jsonPath":".status.targetedNFs"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NfDeploySpec {
    /// Public land mobile network the deployment serves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plmn: Option<Plmn>,
    /// Capacity profile of the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    /// Network functions and the sites they run on.
    #[serde(default)]
    pub sites: Vec<Site>,
}

/// Mobile country and network code.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct Plmn {
    /// Mobile country code.
    #[serde(default)]
    pub mcc: i32,
    /// Mobile network code.
    #[serde(default)]
    pub mnc: i32,
}

/// A single network function and where it runs.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Unique id of the network function within the deployment.
    #[serde(default)]
    pub id: String,
    /// Cluster the network function is deployed to.
    #[serde(default)]
    pub cluster_name: String,
    /// One of upf, smf or amf.
    #[serde(default, rename = "nfType")]
    pub nf_type: String,
    /// Name of the NF type profile.
    #[serde(default, rename = "nfTypeName")]
    pub nf_type_name: String,
    /// Vendor of the network function.
    #[serde(default, rename = "nfVendor")]
    pub nf_vendor: String,
    /// Version of the network function.
    #[serde(default, rename = "nfVersion")]
    pub nf_version: String,
    #[serde(default, rename = "ipAddrBlock", skip_serializing_if = "Vec::is_empty")]
    pub ip_addr_block: Vec<String>,
    /// Neighbors of this network function. Connectivity must be declared on both ends.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectivities: Vec<Connectivity>,
}

/// A link to another site of the same deployment.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    /// Id of the neighboring site.
    pub neighbor_name: String,
}

/// Kinds of network functions that can be deployed.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum NfType {
    /// User plane function.
    Upf,
    /// Session management function.
    Smf,
    /// Access and mobility management function.
    Amf,
}

impl NfType {
    /// Parse the nfType of a site.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upf" => Some(NfType::Upf),
            "smf" => Some(NfType::Smf),
            "amf" => Some(NfType::Amf),
            _ => None,
        }
    }
}

impl fmt::Display for NfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NfType::Upf => "upf",
            NfType::Smf => "smf",
            NfType::Amf => "amf",
        })
    }
}

/// Condition types reported on an NfDeploy.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, JsonSchema)]
pub enum NfDeployConditionType {
    /// Some network functions are still converging.
    Reconciling,
    /// Some network functions cannot make progress.
    Stalled,
    /// Network functions are establishing connections to their neighbors.
    Peering,
    /// Every network function is ready.
    Ready,
}

/// Condition of an NfDeploy.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NfDeployCondition {
    /// Type of the condition.
    #[serde(rename = "type")]
    pub type_: NfDeployConditionType,
    /// Status of the condition.
    pub status: ConditionStatus,
    /// Last time the condition was updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Time>,
    /// Last time the status changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    /// Reason for the last transition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Human readable details.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Aggregate state of the deployment.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy, JsonSchema)]
pub enum NfDeployPhase {
    /// At least one network function is stalled.
    Stalled,
    /// Network functions are converging.
    Reconciling,
    /// Network functions are connecting to their neighbors.
    Peering,
    /// All network functions are ready.
    Ready,
    /// No edge status has been received.
    #[default]
    Unknown,
}

/// Observed state of an NfDeploy, aggregated from the edge.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NfDeployStatus {
    /// Generation of the spec the status reflects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Number of network functions in the deployment.
    #[serde(default, rename = "targetedNFs")]
    pub targeted_nfs: i32,
    /// Number of ready network functions.
    #[serde(default, rename = "readyNFs")]
    pub ready_nfs: i32,
    /// Number of available network functions.
    #[serde(default, rename = "availableNFs")]
    pub available_nfs: i32,
    /// Number of stalled network functions.
    #[serde(default, rename = "stalledNFs")]
    pub stalled_nfs: i32,
    /// Aggregate phase.
    #[serde(default)]
    pub phase: NfDeployPhase,
    #[serde(default)]
    pub conditions: Vec<NfDeployCondition>,
}

impl NfDeployStatus {
    /// Condition with the given type.
    pub fn condition(&self, type_: NfDeployConditionType) -> Option<&NfDeployCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
