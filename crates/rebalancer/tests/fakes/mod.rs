#![allow(dead_code)]

//! Shared test fixtures: a recording fake orchestrator, a fake wake-on-LAN
//! helper and the canned two-node cluster the scenario tests start from.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sugars::{rc, refcell};

use rebalancer::core::common::{Error, Migration, Result, SuspendState, VmState};
use rebalancer::core::compute_api::{ComputeApi, InstanceSpec, WakeOnLan};
use rebalancer::core::rules::RuleStore;
use rebalancer::core::stats::{HostStats, InstanceStats, StatsStore};

pub const WAKE_MAC: &str = "52:54:00:aa:bb:cc";

/// Recording orchestrator double. Commands are appended to the public
/// vectors; the migration log is whatever the test put into `migrations`.
#[derive(Default)]
pub struct FakeCompute {
    pub live_migrations: Vec<(String, String)>,
    pub cold_migrations: Vec<String>,
    pub suspended_hosts: Vec<String>,
    pub prepared_hosts: Vec<String>,
    pub migrations: Vec<Migration>,
    pub fail_live_migrate: bool,
}

impl FakeCompute {
    pub fn new() -> Self {
        Default::default()
    }
}

impl ComputeApi for FakeCompute {
    fn live_migrate(
        &mut self,
        instance_uuid: &str,
        _block_migration: bool,
        _disk_over_commit: bool,
        host: &str,
    ) -> Result<()> {
        if self.fail_live_migrate {
            return Err(Error::Transient("live migration RPC failed".to_string()));
        }
        self.live_migrations.push((instance_uuid.to_string(), host.to_string()));
        Ok(())
    }

    fn cold_migrate(&mut self, instance_uuid: &str) -> Result<()> {
        self.cold_migrations.push(instance_uuid.to_string());
        Ok(())
    }

    fn suspend_host(&mut self, host: &str) -> Result<()> {
        self.suspended_hosts.push(host.to_string());
        Ok(())
    }

    fn prepare_host_for_suspending(&mut self, host: &str) -> Result<String> {
        self.prepared_hosts.push(host.to_string());
        Ok(WAKE_MAC.to_string())
    }

    fn migrations_in_progress(&self, host: &str) -> Result<Vec<Migration>> {
        Ok(self
            .migrations
            .iter()
            .filter(|m| m.source == host)
            .cloned()
            .collect())
    }

    fn instance_spec(&self, instance_uuid: &str) -> Result<InstanceSpec> {
        Ok(InstanceSpec {
            instance_uuid: instance_uuid.to_string(),
            project_id: "fake".to_string(),
            ..Default::default()
        })
    }
}

#[derive(Default)]
pub struct FakeWol {
    pub woken: Vec<String>,
    pub fail: bool,
}

impl WakeOnLan for FakeWol {
    fn wake(&mut self, mac: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Transient("magic packet send failed".to_string()));
        }
        self.woken.push(mac.to_string());
        Ok(())
    }
}

pub fn sample_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 3, 10, 12, 0, 0).unwrap()
}

/// Compute node record with the fixture defaults.
pub fn host(
    name: &str,
    compute_id: u32,
    vcpus: u32,
    memory_total: u64,
    memory_used: u64,
    cpu_used_percent: f64,
) -> HostStats {
    HostStats {
        hypervisor_hostname: name.to_string(),
        compute_id,
        host: name.to_string(),
        ha: "ha1".to_string(),
        az: "nova".to_string(),
        host_ip: "127.0.0.1".to_string(),
        vcpus,
        memory_total,
        memory_used,
        cpu_used_percent,
        hypervisor_type: "xen".to_string(),
        capabilities: BTreeSet::new(),
        service_up: true,
        service_disabled: false,
        suspend_state: SuspendState::Active,
        mac_to_wake: None,
    }
}

/// Instance sample with the fixture defaults: a live CPU window but no
/// `updated_at`, so the derived CPU fraction reads as 0.
pub fn instance(uuid: &str, on_host: &str, vm_state: VmState, mem: u64) -> InstanceStats {
    InstanceStats {
        instance_uuid: uuid.to_string(),
        libvirt_id: 1,
        host: on_host.to_string(),
        vcpus: 1,
        vm_state,
        task_state: None,
        cpu_time: 123123123,
        prev_cpu_time: 12000000,
        mem,
        block_dev_iops: 1000,
        prev_block_dev_iops: 1000,
        created_at: sample_time() - Duration::seconds(60),
        updated_at: None,
        prev_updated_at: None,
    }
}

pub struct TestEnv {
    pub store: Rc<RefCell<StatsStore>>,
    pub rules: Rc<RefCell<RuleStore>>,
    pub compute: Rc<RefCell<FakeCompute>>,
    pub wol: Rc<RefCell<FakeWol>>,
}

impl TestEnv {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            store: rc!(refcell!(StatsStore::new())),
            rules: rc!(refcell!(RuleStore::new())),
            compute: rc!(refcell!(FakeCompute::new())),
            wol: rc!(refcell!(FakeWol::default())),
        }
    }

    pub fn compute_api(&self) -> Rc<RefCell<dyn ComputeApi>> {
        self.compute.clone()
    }

    pub fn wol_api(&self) -> Rc<RefCell<dyn WakeOnLan>> {
        self.wol.clone()
    }

    pub fn add_node(&self, node: HostStats) {
        self.store.borrow_mut().host_upsert(node, sample_time());
    }

    pub fn add_instance(&self, sample: InstanceStats) {
        self.store.borrow_mut().instance_upsert(sample);
    }

    /// The canned cluster: node1 (1 vCPU, 1024 MB, 512 used, 15% CPU) with
    /// the active instance xxx and the stopped instance zzz, node2
    /// (2 vCPUs, 2048 MB, 1024 used, 15% CPU) with the active instance yyy.
    pub fn add_default_cluster(&self) {
        self.add_node(host("node1", 1, 1, 1024, 512, 15.));
        self.add_node(host("node2", 2, 2, 2048, 1024, 15.));
        self.add_instance(instance("xxx", "node1", VmState::Active, 512));
        self.add_instance(instance("yyy", "node2", VmState::Active, 512));
        self.add_instance(instance("zzz", "node1", VmState::Stopped, 512));
    }

    pub fn set_suspend_state(&self, node: &str, state: SuspendState) {
        self.store.borrow_mut().set_suspend_state(node, state).unwrap();
    }

    pub fn suspend_state(&self, node: &str) -> SuspendState {
        self.store.borrow().get_host(node).unwrap().suspend_state
    }
}

pub fn migration(uuid: &str, source: &str, destination: &str, status: rebalancer::core::common::MigrationStatus) -> Migration {
    Migration {
        instance_uuid: uuid.to_string(),
        source: source.to_string(),
        destination: destination.to_string(),
        status,
    }
}
