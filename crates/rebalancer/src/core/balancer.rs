//! Balancer strategies deciding what to migrate and where.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::core::common::{Migration, Result, TaskState, VmState};
use crate::core::compute_api::ComputeApi;
use crate::core::config::LoadBalancerConfig;
use crate::core::host_filter::{
    filter_hosts, host_filter_resolver, FilterProperties, HostFilter, InstanceResources,
};
use crate::core::metrics::{
    calculate_sd, host_loads_from_instances, instance_metrics, normalize_instances, weigh_instances,
    InstanceMetrics, MetricWeights,
};
use crate::core::rules::{self, RuleStore};
use crate::core::stats::{HostStats, InstanceStats, StatsFilter, StatsStore};
use crate::core::threshold::{ClusterSnapshot, ExtraInfo};

/// The (instance, destination) pair a balancing pass settled on.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationTarget {
    pub instance_uuid: String,
    pub destination: String,
}

/// Trait for implementation of balancer strategies.
pub trait BalancerStrategy {
    /// Picks an instance on the victim host and a destination for it, and
    /// requests the migration. Returns `None` when the pass decided that
    /// nothing should move.
    fn balance(
        &self,
        snapshot: &ClusterSnapshot,
        victim: &str,
        extra: &ExtraInfo,
    ) -> Result<Option<MigrationTarget>>;

    /// Drains a host: cold-migrates its stopped instances and live-migrates
    /// the active ones. Returns true iff at least one migration was
    /// enqueued (an empty host drains vacuously), false when no instance
    /// could be placed anywhere.
    fn migrate_all_from_host(&self, host: &str) -> Result<bool>;

    /// Post-migration bookkeeping once the orchestrator reports the
    /// migration finished.
    fn confirm_migration(&self, migration: &Migration) -> Result<()>;
}

pub fn balancer_resolver(
    class_name: &str,
    store: Rc<RefCell<StatsStore>>,
    rules: Rc<RefCell<RuleStore>>,
    compute: Rc<RefCell<dyn ComputeApi>>,
    config: Rc<LoadBalancerConfig>,
) -> Box<dyn BalancerStrategy> {
    match class_name {
        "minimize_sd" => Box::new(MinimizeSd::new(store, rules, compute, config)),
        _ => panic!("Can't resolve balancer class: {}", class_name),
    }
}

/// Balancer that evaluates every admissible destination by simulating the
/// move on the per-host load map and keeps the one with the lowest combined
/// standard deviation.
pub struct MinimizeSd {
    store: Rc<RefCell<StatsStore>>,
    rules: Rc<RefCell<RuleStore>>,
    compute: Rc<RefCell<dyn ComputeApi>>,
    filters: Vec<Box<dyn HostFilter>>,
    config: Rc<LoadBalancerConfig>,
}

impl MinimizeSd {
    pub fn new(
        store: Rc<RefCell<StatsStore>>,
        rules: Rc<RefCell<RuleStore>>,
        compute: Rc<RefCell<dyn ComputeApi>>,
        config: Rc<LoadBalancerConfig>,
    ) -> Self {
        let filters = host_filter_resolver(&config.load_balancer_default_filters, compute.clone(), &config);
        Self {
            store,
            rules,
            compute,
            filters,
            config,
        }
    }

    /// Selection rows for the instances eligible to move: running, not
    /// already migrating and with a live CPU window.
    fn candidate_metrics(&self, instances: &[InstanceStats]) -> Vec<InstanceMetrics> {
        instances
            .iter()
            .filter(|i| i.vm_state == VmState::Active)
            .filter(|i| i.task_state != Some(TaskState::Migrating))
            .filter(|i| i.prev_cpu_time != 0)
            .map(instance_metrics)
            .collect()
    }

    /// Normalises and weighs the candidates, returning the cheapest one
    /// with its unnormalised resources. Under CPU overload the pool is
    /// restricted to memory-light instances and the CPU weight is flipped,
    /// so the CPU-heaviest of them wins.
    fn choose_instance(
        &self,
        instances: &[InstanceStats],
        cpu_overload: bool,
    ) -> Option<InstanceResources> {
        let candidates = self.candidate_metrics(instances);
        if candidates.is_empty() {
            warn!("Instances could not be found. Skipping balancing");
            return None;
        }
        let normalized = normalize_instances(&candidates);
        let pool: Vec<InstanceMetrics> = if cpu_overload {
            normalized.into_iter().filter(|row| row.memory == 0.).collect()
        } else {
            normalized
        };
        let weights = MetricWeights {
            cpu: if cpu_overload {
                -self.config.cpu_weight
            } else {
                self.config.cpu_weight
            },
            memory: self.config.memory_weight,
            io: self.config.io_weight,
        };
        let weighed = weigh_instances(&pool, &weights);
        let chosen = weighed.first()?;
        let original = candidates.iter().find(|row| row.uuid == chosen.uuid)?;
        Some(InstanceResources {
            uuid: original.uuid.clone(),
            cpu: original.cpu,
            memory: original.memory as u64,
            io: original.io,
        })
    }

    /// Runs the filter chain and scores every surviving host by the
    /// standard deviation the cluster would have after the move. Returns
    /// `None` when the chain rejects everything.
    fn select_destination(
        &self,
        nodes: &[HostStats],
        instances: &[InstanceStats],
        victim: &str,
        resources: &InstanceResources,
        retry_hosts: &[String],
    ) -> Result<Option<String>> {
        let spec = self.compute.borrow().instance_spec(&resources.uuid)?;
        let props = FilterProperties {
            spec,
            instance_resources: resources.clone(),
            source_host: Some(victim.to_string()),
            retry_hosts: retry_hosts.to_vec(),
        };
        let filtered = filter_hosts(nodes.to_vec(), &props, &self.filters);
        if filtered.is_empty() {
            return Ok(None);
        }

        let base_loads = host_loads_from_instances(nodes, instances);
        let victim_memory_total = nodes
            .iter()
            .find(|n| n.hypervisor_hostname == victim)
            .map_or(1, |n| n.memory_total.max(1));

        let mut best: Option<(f64, f64, String)> = None;
        for host in &filtered {
            let mut loads = base_loads.clone();
            if host.hypervisor_hostname != victim {
                if let Some(source) = loads.get_mut(victim) {
                    source.cpu = (source.cpu - resources.cpu).max(0.);
                    source.mem =
                        (source.mem - resources.memory as f64 / victim_memory_total as f64).max(0.);
                }
                if let Some(target) = loads.get_mut(&host.hypervisor_hostname) {
                    target.cpu += resources.cpu;
                    target.mem += resources.memory as f64 / host.memory_total.max(1) as f64;
                }
            }
            let (cpu_sd, _) = calculate_sd(loads.values().map(|l| l.cpu));
            let (mem_sd, _) = calculate_sd(loads.values().map(|l| l.mem));
            let score = self.config.compute_cpu_weight * cpu_sd + self.config.compute_memory_weight * mem_sd;
            debug!(
                "destination candidate {} for instance {} scores {:.6}",
                host.hypervisor_hostname, resources.uuid, score
            );
            let key = (score, host.cpu_used_percent, host.hypervisor_hostname.clone());
            if best.as_ref().map_or(true, |current| key < *current) {
                best = Some(key);
            }
        }
        Ok(best.map(|(_, _, host)| host))
    }

    /// Issues the migration command: live towards an explicit destination,
    /// cold otherwise. An identical migration already in flight suppresses
    /// the command.
    fn migrate(&self, uuid: &str, source: &str, destination: Option<&str>) -> Result<bool> {
        match destination {
            Some(dest) => {
                let in_flight = self.compute.borrow().migrations_in_progress(source)?;
                let duplicate = in_flight.iter().any(|m| {
                    m.status.in_progress()
                        && m.instance_uuid == uuid
                        && m.source == source
                        && m.destination == dest
                });
                if duplicate {
                    debug!("migration of {} from {} to {} is already in flight", uuid, source, dest);
                    return Ok(false);
                }
                self.compute.borrow_mut().live_migrate(uuid, false, false, dest)?;
                self.store.borrow_mut().reset_prev_cpu_time(uuid)?;
                info!("requested live migration of {} from {} to {}", uuid, source, dest);
                Ok(true)
            }
            None => {
                self.compute.borrow_mut().cold_migrate(uuid)?;
                info!("requested cold migration of {} off {}", uuid, source);
                Ok(true)
            }
        }
    }
}

impl BalancerStrategy for MinimizeSd {
    fn balance(
        &self,
        snapshot: &ClusterSnapshot,
        victim: &str,
        extra: &ExtraInfo,
    ) -> Result<Option<MigrationTarget>> {
        let on_victim: Vec<InstanceStats> = snapshot
            .instances
            .iter()
            .filter(|i| i.host == victim)
            .cloned()
            .collect();
        let resources = match self.choose_instance(&on_victim, extra.cpu_overload) {
            Some(resources) => resources,
            None => return Ok(None),
        };
        let destination = match self.select_destination(
            &snapshot.hosts,
            &snapshot.instances,
            victim,
            &resources,
            &[],
        )? {
            Some(destination) => destination,
            None => {
                warn!("no feasible destination for instance {}", resources.uuid);
                return Ok(None);
            }
        };
        if destination == victim {
            info!("host {} is already optimal for instance {}", victim, resources.uuid);
            return Ok(None);
        }
        self.migrate(&resources.uuid, victim, Some(&destination))?;
        Ok(Some(MigrationTarget {
            instance_uuid: resources.uuid,
            destination,
        }))
    }

    fn migrate_all_from_host(&self, host: &str) -> Result<bool> {
        let (instances, nodes, cluster_instances) = {
            let store = self.store.borrow();
            let instances = store.instances_on_host(host);
            let active_nodes = store.list_hosts(&StatsFilter::default());
            let allowed = rules::allowed_hosts(&active_nodes, &self.rules.borrow().list());
            let nodes = store.list_hosts(&StatsFilter {
                allowed_hosts: Some(allowed),
                include_hosts: vec![host.to_string()],
                ..Default::default()
            });
            (instances, nodes, store.list_instances())
        };
        if instances.is_empty() {
            debug!("host {} is already empty", host);
            return Ok(true);
        }

        let mut enqueued = 0;
        for instance in instances.iter().filter(|i| i.vm_state == VmState::Stopped) {
            if enqueued >= self.config.max_migrations {
                break;
            }
            if self.migrate(&instance.instance_uuid, host, None)? {
                enqueued += 1;
            }
        }

        let active: Vec<InstanceStats> = instances
            .iter()
            .filter(|i| i.vm_state == VmState::Active)
            .cloned()
            .collect();
        let candidates = self.candidate_metrics(&active);
        let normalized = normalize_instances(&candidates);
        let weights = MetricWeights {
            cpu: self.config.cpu_weight,
            memory: self.config.memory_weight,
            io: self.config.io_weight,
        };
        // the drained host never receives its own instances back
        let retry_hosts = vec![host.to_string()];
        for weighed in weigh_instances(&normalized, &weights) {
            if enqueued >= self.config.max_migrations {
                break;
            }
            let original = match candidates.iter().find(|row| row.uuid == weighed.uuid) {
                Some(row) => row,
                None => continue,
            };
            let resources = InstanceResources {
                uuid: original.uuid.clone(),
                cpu: original.cpu,
                memory: original.memory as u64,
                io: original.io,
            };
            match self.select_destination(&nodes, &cluster_instances, host, &resources, &retry_hosts)? {
                Some(destination) => {
                    if self.migrate(&resources.uuid, host, Some(&destination))? {
                        enqueued += 1;
                    }
                }
                None => {
                    debug!("no destination passes the filters for instance {}", resources.uuid);
                }
            }
        }
        Ok(enqueued > 0)
    }

    fn confirm_migration(&self, migration: &Migration) -> Result<()> {
        info!(
            "confirmed migration of {} from {} to {}",
            migration.instance_uuid, migration.source, migration.destination
        );
        self.store.borrow_mut().relocate_instance(migration)
    }
}
