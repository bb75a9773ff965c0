//! Reduces the conditions reported by individual network functions into NfDeploy conditions.
use std::collections::BTreeMap;

use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::Time,
    chrono::{DateTime, Utc},
};
use serde::Deserialize;

use crate::{
    conditions::ConditionStatus,
    nfdeploy::{NfDeployCondition, NfDeployConditionType, NfDeployPhase},
};

/// Condition types reported by a UPFDeployment or SMFDeployment.
#[derive(Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum NfConditionType {
    Reconciling,
    Stalled,
    Peering,
    Ready,
    Available,
}

impl NfConditionType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Reconciling" => Some(NfConditionType::Reconciling),
            "Stalled" => Some(NfConditionType::Stalled),
            "Peering" => Some(NfConditionType::Peering),
            "Ready" => Some(NfConditionType::Ready),
            "Available" => Some(NfConditionType::Available),
            _ => None,
        }
    }
}

/// A condition as found in the status of an edge NF deployment.
#[derive(Deserialize, Debug, Default, PartialEq, Clone)]
pub struct NfCondition {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub status: ConditionStatus,
    #[serde(default)]
    pub message: String,
}

/// In memory status of a single network function.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct NfStatus {
    /// Dominant condition of the NF, `None` until a first event arrived.
    pub state: Option<NfConditionType>,
    pub state_message: String,
    /// Conditions that are True, with their messages.
    pub active_conditions: BTreeMap<NfConditionType, String>,
    pub last_event_timestamp: Option<DateTime<Utc>>,
}

impl NfStatus {
    fn stalled(message: &str) -> Self {
        NfStatus {
            state: Some(NfConditionType::Stalled),
            state_message: message.to_owned(),
            active_conditions: BTreeMap::from([(NfConditionType::Stalled, message.to_owned())]),
            last_event_timestamp: None,
        }
    }

    fn is_active(&self, type_: NfConditionType) -> bool {
        self.active_conditions.contains_key(&type_)
    }
}

/// Full set of NF conditions where anything not reported is Unknown.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct NfConditionSet {
    status: BTreeMap<NfConditionType, ConditionStatus>,
    message: BTreeMap<NfConditionType, String>,
    /// Some reported condition is True, whatever its type.
    any_true: bool,
}

impl NfConditionSet {
    /// Build the set from reported conditions. Unrecognised types only count towards
    /// [`NfConditionSet::is_ambiguous`].
    pub fn new(conditions: &[NfCondition]) -> Self {
        let mut set = NfConditionSet::default();
        for condition in conditions {
            set.any_true |= condition.status == ConditionStatus::True;
            if let Some(type_) = NfConditionType::parse(&condition.type_) {
                set.status.insert(type_, condition.status);
                set.message.insert(type_, condition.message.clone());
            }
        }
        set
    }

    fn status(&self, type_: NfConditionType) -> ConditionStatus {
        self.status.get(&type_).copied().unwrap_or_default()
    }

    fn is(&self, type_: NfConditionType, status: ConditionStatus) -> bool {
        self.status(type_) == status
    }

    fn message(&self, type_: NfConditionType) -> String {
        self.message.get(&type_).cloned().unwrap_or_default()
    }

    fn neither_available_nor_reconciling(&self) -> bool {
        self.is(NfConditionType::Available, ConditionStatus::False)
            && self.is(NfConditionType::Reconciling, ConditionStatus::False)
    }

    /// A set is ambiguous when no condition is True and it does not imply a stall.
    pub fn is_ambiguous(&self) -> bool {
        !self.any_true && !self.neither_available_nor_reconciling()
    }

    /// Returns a stalled status if the set contradicts itself.
    fn inconsistency(&self) -> Option<NfStatus> {
        use ConditionStatus::{False, True};
        use NfConditionType::*;

        let message = if self.is(Ready, True) && self.is(Stalled, True) {
            "Inconsistent NFTypeDeploy status received. Ready and stalled \
             conditions cannot be true at the same time."
        } else if (self.is(Ready, True) || self.is(Peering, True)) && self.is(Available, False) {
            "Inconsistent NFTypeDeploy status received. Available condition cannot be false \
             when ready or peering conditions are true."
        } else if self.is(Reconciling, False) && self.is(Peering, True) {
            "Inconsistent NFTypeDeploy status received. Reconciling condition cannot be false \
             when peering condition is true."
        } else if (self.is(Peering, True) || self.is(Reconciling, True)) && self.is(Ready, True) {
            "Inconsistent NFTypeDeploy status received. Ready condition cannot be true when \
             either reconciling or peering condition are true."
        } else {
            return None;
        };
        Some(NfStatus::stalled(message))
    }

    /// Compute the status of the NF from its conditions.
    pub fn nf_status(&self) -> NfStatus {
        use NfConditionType::*;

        if let Some(status) = self.inconsistency() {
            return status;
        }
        if self.neither_available_nor_reconciling() {
            return NfStatus::stalled("NF is neither available nor reconciling.");
        }

        let mut active_conditions: BTreeMap<NfConditionType, String> = self
            .status
            .iter()
            .filter(|(_, status)| **status == ConditionStatus::True)
            .map(|(type_, _)| (*type_, self.message(*type_)))
            .collect();

        let state = if self.is(Stalled, ConditionStatus::True) {
            Stalled
        } else if self.is(Ready, ConditionStatus::True) {
            active_conditions
                .entry(Available)
                .or_insert_with(|| "NF is in ready state.".to_owned());
            Ready
        } else if self.is(Peering, ConditionStatus::True) {
            for type_ in [Reconciling, Available] {
                active_conditions
                    .entry(type_)
                    .or_insert_with(|| "NF is in peering state.".to_owned());
            }
            Peering
        } else if self.is(Reconciling, ConditionStatus::True) {
            Reconciling
        } else {
            Available
        };
        NfStatus {
            state: Some(state),
            state_message: self.message(state),
            active_conditions,
            last_event_timestamp: None,
        }
    }
}

/// NfDeploy status computed from the network functions, without timestamps.
#[derive(Debug, PartialEq, Clone)]
pub struct AggregateStatus {
    pub targeted_nfs: i32,
    pub ready_nfs: i32,
    pub available_nfs: i32,
    pub stalled_nfs: i32,
    pub phase: NfDeployPhase,
    /// Ordered Stalled, Ready, Peering, Reconciling.
    pub conditions: Vec<NfDeployCondition>,
}

fn condition(
    type_: NfDeployConditionType,
    status: ConditionStatus,
    reason: &str,
    message: String,
) -> NfDeployCondition {
    NfDeployCondition {
        type_,
        status,
        last_update_time: None,
        last_transition_time: None,
        reason: reason.to_owned(),
        message,
    }
}

fn id_list<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    ids.collect::<Vec<_>>().join(", ")
}

fn stalled_condition(nfs: &[(&str, &NfStatus)], stalled: usize) -> NfDeployCondition {
    let status = if stalled != 0 {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    };
    let reason = if stalled == nfs.len() {
        "AllNFsStalled"
    } else if stalled == 0 {
        "NoNFsStalled"
    } else {
        "SomeNFsStalled"
    };
    let message = if stalled == 0 {
        "No NFs are in stalled state.".to_owned()
    } else {
        let details = nfs
            .iter()
            .filter_map(|(id, status)| {
                status
                    .active_conditions
                    .get(&NfConditionType::Stalled)
                    .map(|message| format!("{id}: {message}"))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{details}.")
    };
    condition(NfDeployConditionType::Stalled, status, reason, message)
}

fn ready_condition(nfs: &[(&str, &NfStatus)], ready: usize) -> NfDeployCondition {
    let targeted = nfs.len();
    let status = if ready == targeted {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    };
    let reason = if ready == 0 {
        "NoNFsReady"
    } else if ready == targeted {
        "AllNFsReady"
    } else {
        "SomeNFsReady"
    };
    let message = if ready == targeted {
        "All NFs are in Ready state.".to_owned()
    } else {
        let not_ready = nfs
            .iter()
            .filter(|(_, status)| !status.is_active(NfConditionType::Ready))
            .map(|(id, _)| *id);
        format!("The NFs which are not in Ready state are: {}.", id_list(not_ready))
    };
    condition(NfDeployConditionType::Ready, status, reason, message)
}

/// Shared shape of the Peering and Reconciling conditions.
struct Progress {
    type_: NfDeployConditionType,
    nf_condition: NfConditionType,
    all_done: (&'static str, &'static str),
    all_progressing: &'static str,
    some_progressing: &'static str,
    none_progressing: (&'static str, &'static str),
}

const PEERING: Progress = Progress {
    type_: NfDeployConditionType::Peering,
    nf_condition: NfConditionType::Peering,
    all_done: ("AllNFsPeered", "All NFs are in Peered state."),
    all_progressing: "AllUnPeeredNFsPeering",
    some_progressing: "SomeNFsPeering",
    none_progressing: ("NoNFsPeering", "No NFs are in peering state."),
};

const RECONCILING: Progress = Progress {
    type_: NfDeployConditionType::Reconciling,
    nf_condition: NfConditionType::Reconciling,
    all_done: ("AllNFsReconciled", "All NFs are in reconciled state."),
    all_progressing: "AllUnReconciledNFsReconciling",
    some_progressing: "SomeNFsReconciling",
    none_progressing: ("NoNFsReconciling", "No NFs are in reconciling state."),
};

fn progress_condition(
    progress: &Progress,
    nfs: &[(&str, &NfStatus)],
    ready: usize,
) -> NfDeployCondition {
    let targeted = nfs.len();
    if ready == targeted {
        let (reason, message) = progress.all_done;
        return condition(progress.type_, ConditionStatus::False, reason, message.to_owned());
    }
    let in_progress: Vec<&str> = nfs
        .iter()
        .filter(|(_, status)| status.is_active(progress.nf_condition))
        .map(|(id, _)| *id)
        .collect();
    let message = format!(
        "The NFs which are in {:?} state are: {}.",
        progress.nf_condition,
        in_progress.join(", ")
    );
    if ready + in_progress.len() == targeted {
        condition(progress.type_, ConditionStatus::True, progress.all_progressing, message)
    } else if !in_progress.is_empty() {
        condition(progress.type_, ConditionStatus::True, progress.some_progressing, message)
    } else {
        let (reason, message) = progress.none_progressing;
        condition(progress.type_, ConditionStatus::False, reason, message.to_owned())
    }
}

/// The first True condition in the order Stalled, Reconciling, Peering, Ready.
fn phase(conditions: &[NfDeployCondition]) -> NfDeployPhase {
    let is_true = |type_| {
        conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == ConditionStatus::True)
    };
    if is_true(NfDeployConditionType::Stalled) {
        NfDeployPhase::Stalled
    } else if is_true(NfDeployConditionType::Reconciling) {
        NfDeployPhase::Reconciling
    } else if is_true(NfDeployConditionType::Peering) {
        NfDeployPhase::Peering
    } else if is_true(NfDeployConditionType::Ready) {
        NfDeployPhase::Ready
    } else {
        NfDeployPhase::Unknown
    }
}

/// Aggregate the status of the targeted network functions.
pub fn aggregate(nfs: &[(&str, &NfStatus)]) -> AggregateStatus {
    let count = |type_| nfs.iter().filter(|(_, s)| s.is_active(type_)).count();
    let ready = count(NfConditionType::Ready);
    let stalled = count(NfConditionType::Stalled);
    let available = count(NfConditionType::Available);

    let conditions = vec![
        stalled_condition(nfs, stalled),
        ready_condition(nfs, ready),
        progress_condition(&PEERING, nfs, ready),
        progress_condition(&RECONCILING, nfs, ready),
    ];
    AggregateStatus {
        targeted_nfs: nfs.len() as i32,
        ready_nfs: ready as i32,
        available_nfs: available as i32,
        stalled_nfs: stalled as i32,
        phase: phase(&conditions),
        conditions,
    }
}

/// Status reported for every deployment when the edge cannot be watched.
pub fn edge_failure(reason: &str, message: &str) -> AggregateStatus {
    let conditions = [
        NfDeployConditionType::Stalled,
        NfDeployConditionType::Ready,
        NfDeployConditionType::Peering,
        NfDeployConditionType::Reconciling,
    ]
    .into_iter()
    .map(|type_| condition(type_, ConditionStatus::Unknown, reason, message.to_owned()))
    .collect();
    AggregateStatus {
        targeted_nfs: 0,
        ready_nfs: 0,
        available_nfs: 0,
        stalled_nfs: 0,
        phase: NfDeployPhase::Unknown,
        conditions,
    }
}

/// Stamp computed conditions with times, carrying over those of unchanged conditions.
pub fn merge_conditions(
    existing: &[NfDeployCondition],
    computed: Vec<NfDeployCondition>,
    now: DateTime<Utc>,
) -> Vec<NfDeployCondition> {
    computed
        .into_iter()
        .map(|mut condition| {
            let old = existing.iter().find(|c| c.type_ == condition.type_);
            match old {
                Some(old)
                    if old.status == condition.status
                        && old.reason == condition.reason
                        && old.message == condition.message =>
                {
                    condition.last_update_time = old.last_update_time.clone();
                    condition.last_transition_time = old.last_transition_time.clone();
                }
                Some(old) if old.status == condition.status => {
                    condition.last_update_time = Some(Time(now));
                    condition.last_transition_time = old.last_transition_time.clone();
                }
                _ => {
                    condition.last_update_time = Some(Time(now));
                    condition.last_transition_time = Some(Time(now));
                }
            }
            condition
        })
        .collect()
}
