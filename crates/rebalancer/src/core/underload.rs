//! Underload detection and the host suspend/unsuspend state machine.
//!
//! Host states move only along
//! `active -> suspending -> suspended -> active`, with a rollback from
//! `suspending` to `active` when a drain turns out to be infeasible.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::core::balancer::{BalancerStrategy, MinimizeSd};
use crate::core::common::{Error, MigrationStatus, Result, SuspendState};
use crate::core::compute_api::{ComputeApi, WakeOnLan};
use crate::core::config::LoadBalancerConfig;
use crate::core::metrics::host_loads_from_nodes;
use crate::core::rules::{self, RuleStore};
use crate::core::stats::{StateFilter, StatsFilter, StatsStore};
use crate::core::threshold::ExtraInfo;

/// Trait for implementation of underload strategies.
pub trait UnderloadStrategy {
    /// Periodic entry point on the no-overload path: either starts draining
    /// an under-utilised host or, given a high cluster mean, wakes a
    /// suspended one.
    fn indicate(&self, allowed: &HashSet<String>, extra: &ExtraInfo) -> Result<()>;

    /// Starts draining a host towards suspension. Returns false and rolls
    /// the state back when no instance could be placed elsewhere.
    fn suspend_host(&self, host: &str) -> Result<bool>;

    /// Wakes a suspended host over wake-on-LAN.
    fn unsuspend_host(&self, host: &str) -> Result<()>;

    /// Advances every host stuck in `suspending`: confirms finished
    /// migrations, powers the host down once it is empty, or pushes the
    /// drain further.
    fn advance_suspending(&self) -> Result<()>;
}

pub fn underload_resolver(
    class_name: &str,
    store: Rc<RefCell<StatsStore>>,
    rules: Rc<RefCell<RuleStore>>,
    compute: Rc<RefCell<dyn ComputeApi>>,
    wol: Rc<RefCell<dyn WakeOnLan>>,
    config: Rc<LoadBalancerConfig>,
) -> Box<dyn UnderloadStrategy> {
    match class_name {
        "mean_underload" => Box::new(MeanUnderload::new(store, rules, compute, wol, config)),
        _ => panic!("Can't resolve underload class: {}", class_name),
    }
}

/// Suspends a host once its averaged load drops below the configured floor
/// in either dimension, and wakes one back up once the cluster mean climbs
/// over the unsuspend bound.
pub struct MeanUnderload {
    store: Rc<RefCell<StatsStore>>,
    rules: Rc<RefCell<RuleStore>>,
    compute: Rc<RefCell<dyn ComputeApi>>,
    wol: Rc<RefCell<dyn WakeOnLan>>,
    balancer: MinimizeSd,
    config: Rc<LoadBalancerConfig>,
}

impl MeanUnderload {
    pub fn new(
        store: Rc<RefCell<StatsStore>>,
        rules: Rc<RefCell<RuleStore>>,
        compute: Rc<RefCell<dyn ComputeApi>>,
        wol: Rc<RefCell<dyn WakeOnLan>>,
        config: Rc<LoadBalancerConfig>,
    ) -> Self {
        let balancer = MinimizeSd::new(store.clone(), rules.clone(), compute.clone(), config.clone());
        Self {
            store,
            rules,
            compute,
            wol,
            balancer,
            config,
        }
    }

    /// One wake per tick: if the cluster mean is high enough, the first
    /// suspended host is brought back.
    fn indicate_unsuspend(&self, extra: &ExtraInfo) -> Result<()> {
        if extra.cpu_mean > self.config.unsuspend_cpu || extra.ram_mean > self.config.unsuspend_memory {
            let suspended = self.store.borrow().list_hosts(&StatsFilter {
                state: StateFilter::InState(SuspendState::Suspended),
                ..Default::default()
            });
            if let Some(node) = suspended.first() {
                info!(
                    "cluster means (cpu {:.3}, ram {:.3}) call for more capacity",
                    extra.cpu_mean, extra.ram_mean
                );
                self.unsuspend_host(&node.hypervisor_hostname)?;
            }
        }
        Ok(())
    }
}

impl UnderloadStrategy for MeanUnderload {
    fn indicate(&self, allowed: &HashSet<String>, extra: &ExtraInfo) -> Result<()> {
        let nodes = self.store.borrow().list_hosts(&StatsFilter {
            allowed_hosts: Some(allowed.clone()),
            use_mean: true,
            ..Default::default()
        });
        if nodes.len() <= 1 {
            return self.indicate_unsuspend(extra);
        }
        let loads = host_loads_from_nodes(&nodes);
        for (host, load) in &loads {
            if load.cpu < self.config.threshold_cpu || load.mem < self.config.threshold_memory {
                debug!(
                    "host {} is underloaded (cpu {:.3}, mem {:.3})",
                    host, load.cpu, load.mem
                );
                if self.suspend_host(host)? {
                    return Ok(());
                }
            }
        }
        self.indicate_unsuspend(extra)
    }

    fn suspend_host(&self, host: &str) -> Result<bool> {
        let node = self.store.borrow().get_host(host)?;
        if node.suspend_state != SuspendState::Active {
            return Err(Error::WrongState {
                host: host.to_string(),
                state: node.suspend_state,
            });
        }
        if !rules::host_allowed(&node, &self.rules.borrow().list()) {
            return Err(Error::ForbiddenByRule(host.to_string()));
        }
        self.store.borrow_mut().set_suspend_state(host, SuspendState::Suspending)?;
        info!("draining host {} for suspension", host);
        let migrated = self.balancer.migrate_all_from_host(host)?;
        if !migrated {
            warn!("nothing on host {} can be placed elsewhere, aborting drain", host);
            self.store.borrow_mut().set_suspend_state(host, SuspendState::Active)?;
            return Ok(false);
        }
        Ok(true)
    }

    fn unsuspend_host(&self, host: &str) -> Result<()> {
        let node = self.store.borrow().get_host(host)?;
        if node.suspend_state != SuspendState::Suspended {
            return Err(Error::WrongState {
                host: host.to_string(),
                state: node.suspend_state,
            });
        }
        let mac = node
            .mac_to_wake
            .filter(|mac| !mac.is_empty())
            .ok_or_else(|| Error::Transient(format!("no MAC recorded for host {}", host)))?;
        // a failed wake leaves the host suspended for the next attempt
        self.wol.borrow_mut().wake(&mac)?;
        self.store.borrow_mut().set_suspend_state(host, SuspendState::Active)?;
        info!("woke host {}", host);
        Ok(())
    }

    fn advance_suspending(&self) -> Result<()> {
        let suspending = self.store.borrow().list_hosts(&StatsFilter {
            state: StateFilter::InState(SuspendState::Suspending),
            ..Default::default()
        });
        for node in suspending {
            let host = node.hypervisor_hostname.clone();
            let migrations = self.compute.borrow().migrations_in_progress(&host)?;
            for finished in migrations
                .iter()
                .filter(|m| m.source == host && m.status == MigrationStatus::Finished)
            {
                self.balancer.confirm_migration(finished)?;
            }
            if migrations.iter().any(|m| m.source == host && m.status.in_progress()) {
                debug!("host {} still has migrations in progress", host);
                continue;
            }
            if self.store.borrow().host_is_empty(&host) {
                let mac = match node.mac_to_wake.as_deref().filter(|mac| !mac.is_empty()) {
                    Some(mac) => mac.to_string(),
                    None => {
                        let mac = self.compute.borrow_mut().prepare_host_for_suspending(&host)?;
                        self.store.borrow_mut().set_mac_to_wake(&host, &mac)?;
                        mac
                    }
                };
                debug!("host {} is empty, suspending (wake MAC {})", host, mac);
                self.compute.borrow_mut().suspend_host(&host)?;
                self.store.borrow_mut().set_suspend_state(&host, SuspendState::Suspended)?;
                info!("host {} suspended", host);
            } else {
                self.balancer.migrate_all_from_host(&host)?;
            }
        }
        Ok(())
    }
}
