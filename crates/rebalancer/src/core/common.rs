//! Common data structures.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors of the control plane. Transient failures are absorbed and
/// logged at tick boundaries by the periodic driver; everything else is
/// surfaced to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("compute host {0} could not be found")]
    HostNotFound(String),
    #[error("rule {0} could not be found")]
    RuleNotFound(u32),
    #[error("instance {0} could not be found")]
    InstanceNotFound(String),
    #[error("host {host} cannot leave state {state}")]
    WrongState { host: String, state: SuspendState },
    #[error("host {0} is forbidden by load balancer rule")]
    ForbiddenByRule(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("{0}")]
    Validation(String),
}

/// Power state of a compute host as driven by the underload controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspendState {
    Active,
    Suspending,
    Suspended,
}

impl Display for SuspendState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SuspendState::Active => write!(f, "active"),
            SuspendState::Suspending => write!(f, "suspending"),
            SuspendState::Suspended => write!(f, "suspended"),
        }
    }
}

/// State of a virtual machine as reported by the statistics collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Active,
    Stopped,
    Migrating,
    Error,
}

/// Task currently executed on a VM by the orchestrator. Only `Migrating`
/// matters to the balancer, the other states are carried opaquely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Migrating,
    Spawning,
    Rebooting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Queued,
    Running,
    Finished,
    Error,
}

impl MigrationStatus {
    pub fn in_progress(&self) -> bool {
        matches!(self, MigrationStatus::Queued | MigrationStatus::Running)
    }
}

/// Migration record as reported by the orchestrator's migration log.
/// Opaque to the core beyond these fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub instance_uuid: String,
    pub source: String,
    pub destination: String,
    pub status: MigrationStatus,
}
