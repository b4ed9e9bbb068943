//! Consumed contracts of the compute orchestrator and the wake-on-LAN
//! helper. The core drives both through these traits only; production
//! implementations live next to the deployment, tests supply fakes.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::common::{Migration, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageProperties {
    /// Hypervisor the image was built for, if constrained.
    pub hypervisor_type: Option<String>,
    pub architecture: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerGroupPolicy {
    Affinity,
    AntiAffinity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerGroup {
    pub policy: ServerGroupPolicy,
    /// Hosts currently running the other members of the group.
    pub member_hosts: HashSet<String>,
}

/// Placement-relevant metadata of one instance, fetched from the
/// orchestrator when a migration is being planned.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub instance_uuid: String,
    pub project_id: String,
    pub availability_zone: Option<String>,
    pub required_capabilities: BTreeSet<String>,
    pub image_properties: ImageProperties,
    pub server_group: Option<ServerGroup>,
}

/// The orchestrator's migration and host power surface. All calls are
/// bounded-timeout RPCs; an exceeded timeout surfaces as
/// [`crate::core::common::Error::Transient`].
pub trait ComputeApi {
    /// Requests an asynchronous live migration of a running instance.
    fn live_migrate(
        &mut self,
        instance_uuid: &str,
        block_migration: bool,
        disk_over_commit: bool,
        host: &str,
    ) -> Result<()>;

    /// Requests an asynchronous cold migration of a stopped instance; the
    /// orchestrator's scheduler picks the destination.
    fn cold_migrate(&mut self, instance_uuid: &str) -> Result<()>;

    /// Powers the host down. Only called once the host is drained.
    fn suspend_host(&mut self, host: &str) -> Result<()>;

    /// Asks the host for the MAC address to wake it with later.
    fn prepare_host_for_suspending(&mut self, host: &str) -> Result<String>;

    /// Recent migrations whose source is the given host, including
    /// just-finished ones.
    fn migrations_in_progress(&self, host: &str) -> Result<Vec<Migration>>;

    fn instance_spec(&self, instance_uuid: &str) -> Result<InstanceSpec>;
}

/// External helper that sends the magic packet.
pub trait WakeOnLan {
    fn wake(&mut self, mac: &str) -> Result<()>;
}
