//! Read-only projection of hosts and per-VM statistics samples.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::trace;

use crate::core::common::{Error, Migration, Result, SuspendState, TaskState, VmState};

/// Compute host together with its most recent (or averaged) statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct HostStats {
    pub hypervisor_hostname: String,
    pub compute_id: u32,
    /// Service host label, matched by rules of type `host`.
    pub host: String,
    /// High-availability group label, matched by rules of type `ha`.
    pub ha: String,
    /// Availability zone label, matched by rules of type `az`.
    pub az: String,
    pub host_ip: String,
    pub vcpus: u32,
    /// Memory capacity in MB.
    pub memory_total: u64,
    /// Memory used in MB.
    pub memory_used: u64,
    /// CPU usage in percent, 0-100.
    pub cpu_used_percent: f64,
    pub hypervisor_type: String,
    pub capabilities: BTreeSet<String>,
    pub service_up: bool,
    pub service_disabled: bool,
    pub suspend_state: SuspendState,
    pub mac_to_wake: Option<String>,
}

/// Per-VM statistics sample as written by the collector. `cpu_time` is the
/// cumulative CPU time of the guest; the `prev_*` columns hold the values of
/// the previous sample so that instantaneous rates can be derived.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceStats {
    pub instance_uuid: String,
    pub libvirt_id: u32,
    pub host: String,
    pub vcpus: u32,
    pub vm_state: VmState,
    pub task_state: Option<TaskState>,
    pub cpu_time: u64,
    pub prev_cpu_time: u64,
    /// Resident memory in MB.
    pub mem: u64,
    pub block_dev_iops: u64,
    pub prev_block_dev_iops: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub prev_updated_at: Option<DateTime<Utc>>,
}

/// Host visibility selector. Powered-down and draining hosts are excluded
/// from the default listing so that they never enter the SD math or the
/// destination candidate set by accident.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum StateFilter {
    #[default]
    Active,
    InState(SuspendState),
    Any,
}

/// Query parameters of [`StatsStore::list_hosts`].
#[derive(Clone, Debug, Default)]
pub struct StatsFilter {
    /// Allow-list of hypervisor hostnames (the rule engine verdicts).
    pub allowed_hosts: Option<HashSet<String>>,
    pub state: StateFilter,
    /// Hosts returned regardless of state and allow-list. Used when draining:
    /// a `suspending` host must still contribute its load to the math.
    pub include_hosts: Vec<String>,
    /// Answer with per-column averages over the retained sample window
    /// instead of the latest sample.
    pub use_mean: bool,
}

#[derive(Clone, Debug)]
struct NodeSample {
    memory_used: u64,
    cpu_used_percent: f64,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct HostRecord {
    node: HostStats,
    samples: Vec<NodeSample>,
}

/// In-memory projection of the persistent statistics schema. The collector
/// upserts rows, the controller reads snapshots and mutates the suspend
/// state columns; no consistency is guaranteed across two queries beyond
/// "taken within one tick".
pub struct StatsStore {
    hosts: BTreeMap<String, HostRecord>,
    instances: IndexMap<String, InstanceStats>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self {
            hosts: BTreeMap::new(),
            instances: IndexMap::new(),
        }
    }

    /// Registers a host or refreshes its attributes, appending one
    /// statistics sample. Called by the collector on every tick.
    pub fn host_upsert(&mut self, node: HostStats, created_at: DateTime<Utc>) {
        trace!("stats received for host {}", node.hypervisor_hostname);
        let sample = NodeSample {
            memory_used: node.memory_used,
            cpu_used_percent: node.cpu_used_percent,
            created_at,
        };
        match self.hosts.entry(node.hypervisor_hostname.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let suspend_state = record.node.suspend_state;
                let mac_to_wake = record.node.mac_to_wake.take();
                record.node = node;
                // controller-owned columns survive collector refreshes
                record.node.suspend_state = suspend_state;
                record.node.mac_to_wake = mac_to_wake;
                record.samples.push(sample);
            }
            Entry::Vacant(entry) => {
                entry.insert(HostRecord {
                    node,
                    samples: vec![sample],
                });
            }
        }
    }

    /// Inserts or overwrites the statistics sample of one instance.
    pub fn instance_upsert(&mut self, sample: InstanceStats) {
        self.instances.insert(sample.instance_uuid.clone(), sample);
    }

    pub fn list_hosts(&self, filter: &StatsFilter) -> Vec<HostStats> {
        let mut result = Vec::new();
        for record in self.hosts.values() {
            let name = &record.node.hypervisor_hostname;
            let included = filter.include_hosts.iter().any(|h| h == name);
            if !included {
                let state_ok = match filter.state {
                    StateFilter::Active => record.node.suspend_state == SuspendState::Active,
                    StateFilter::InState(state) => record.node.suspend_state == state,
                    StateFilter::Any => true,
                };
                if !state_ok {
                    continue;
                }
                if let Some(allowed) = &filter.allowed_hosts {
                    if !allowed.contains(name) {
                        continue;
                    }
                }
            }
            result.push(self.project(record, filter.use_mean));
        }
        result
    }

    pub fn get_host(&self, host: &str) -> Result<HostStats> {
        self.hosts
            .get(host)
            .map(|record| self.project(record, false))
            .ok_or_else(|| Error::HostNotFound(host.to_string()))
    }

    pub fn instances_on_host(&self, host: &str) -> Vec<InstanceStats> {
        self.instances.values().filter(|i| i.host == host).cloned().collect()
    }

    pub fn list_instances(&self) -> Vec<InstanceStats> {
        self.instances.values().cloned().collect()
    }

    /// A host is empty when neither active nor stopped instances remain
    /// bound to it.
    pub fn host_is_empty(&self, host: &str) -> bool {
        !self.instances.values().any(|i| i.host == host)
    }

    pub fn set_suspend_state(&mut self, host: &str, state: SuspendState) -> Result<()> {
        let record = self
            .hosts
            .get_mut(host)
            .ok_or_else(|| Error::HostNotFound(host.to_string()))?;
        record.node.suspend_state = state;
        Ok(())
    }

    pub fn set_mac_to_wake(&mut self, host: &str, mac: &str) -> Result<()> {
        let record = self
            .hosts
            .get_mut(host)
            .ok_or_else(|| Error::HostNotFound(host.to_string()))?;
        record.node.mac_to_wake = Some(mac.to_string());
        Ok(())
    }

    /// Invalidates the CPU window of an instance so that the next sample is
    /// treated as stale. Called right after a migration is requested.
    pub fn reset_prev_cpu_time(&mut self, instance_uuid: &str) -> Result<()> {
        let sample = self
            .instances
            .get_mut(instance_uuid)
            .ok_or_else(|| Error::InstanceNotFound(instance_uuid.to_string()))?;
        sample.prev_cpu_time = 0;
        Ok(())
    }

    /// Post-migration bookkeeping: rebinds the sample to the destination
    /// host and restarts its rate windows.
    pub fn relocate_instance(&mut self, migration: &Migration) -> Result<()> {
        let sample = self
            .instances
            .get_mut(&migration.instance_uuid)
            .ok_or_else(|| Error::InstanceNotFound(migration.instance_uuid.clone()))?;
        sample.host = migration.destination.clone();
        sample.prev_cpu_time = 0;
        sample.prev_block_dev_iops = sample.block_dev_iops;
        Ok(())
    }

    /// Deletes statistics samples older than the cutoff, both per-host and
    /// per-instance. The mean window of `use_mean` queries is bounded by
    /// this pruning.
    pub fn clear_stats_before(&mut self, cutoff: DateTime<Utc>) {
        for record in self.hosts.values_mut() {
            record.samples.retain(|s| s.created_at >= cutoff);
        }
        self.instances
            .retain(|_, sample| sample.updated_at.unwrap_or(sample.created_at) >= cutoff);
    }

    fn project(&self, record: &HostRecord, use_mean: bool) -> HostStats {
        let mut node = record.node.clone();
        if use_mean && !record.samples.is_empty() {
            let count = record.samples.len() as f64;
            node.memory_used =
                (record.samples.iter().map(|s| s.memory_used).sum::<u64>() as f64 / count).round() as u64;
            node.cpu_used_percent = record.samples.iter().map(|s| s.cpu_used_percent).sum::<f64>() / count;
        } else if let Some(last) = record.samples.last() {
            node.memory_used = last.memory_used;
            node.cpu_used_percent = last.cpu_used_percent;
        }
        node
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}
