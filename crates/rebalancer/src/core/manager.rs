//! Periodic driver ticking the detector, advancing in-flight suspensions
//! and garbage-collecting statistics.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::core::balancer::{balancer_resolver, BalancerStrategy};
use crate::core::common::Result;
use crate::core::compute_api::{ComputeApi, WakeOnLan};
use crate::core::config::LoadBalancerConfig;
use crate::core::rules::{self, RuleStore};
use crate::core::stats::{StatsFilter, StatsStore};
use crate::core::threshold::{threshold_resolver, ClusterSnapshot, ThresholdStrategy, ThresholdVerdict};
use crate::core::underload::{underload_resolver, UnderloadStrategy};

/// The control loop. One instance runs per cluster (leader election is the
/// deployment's job); within it the three recurring tasks are serialised on
/// the owning thread, so they never overlap. Nothing is cached across
/// ticks: rules and statistics are re-read every time.
pub struct LoadBalancer {
    config: Rc<LoadBalancerConfig>,
    store: Rc<RefCell<StatsStore>>,
    rules: Rc<RefCell<RuleStore>>,
    threshold: Box<dyn ThresholdStrategy>,
    balancer: Box<dyn BalancerStrategy>,
    underload: Box<dyn UnderloadStrategy>,
}

impl LoadBalancer {
    /// Wires the strategies named by the configuration. Unknown class names
    /// are a configuration error and abort startup.
    pub fn new(
        config: Rc<LoadBalancerConfig>,
        store: Rc<RefCell<StatsStore>>,
        rules: Rc<RefCell<RuleStore>>,
        compute: Rc<RefCell<dyn ComputeApi>>,
        wol: Rc<RefCell<dyn WakeOnLan>>,
    ) -> Self {
        let threshold = threshold_resolver(&config.threshold_class, config.clone());
        let balancer = balancer_resolver(
            &config.balancer_class,
            store.clone(),
            rules.clone(),
            compute.clone(),
            config.clone(),
        );
        let underload = underload_resolver(
            &config.underload_class,
            store.clone(),
            rules.clone(),
            compute,
            wol,
            config.clone(),
        );
        Self {
            config,
            store,
            rules,
            threshold,
            balancer,
            underload,
        }
    }

    /// Rebalance tick: snapshot, detect, then either balance the overload
    /// away or hand over to the underload controller.
    pub fn indicate_threshold(&self) {
        if let Err(err) = self.balance_once() {
            warn!("rebalance tick failed: {}", err);
        }
    }

    fn balance_once(&self) -> Result<()> {
        let (snapshot, allowed) = {
            let store = self.store.borrow();
            let active = store.list_hosts(&StatsFilter::default());
            let allowed = rules::allowed_hosts(&active, &self.rules.borrow().list());
            let hosts = store.list_hosts(&StatsFilter {
                allowed_hosts: Some(allowed.clone()),
                ..Default::default()
            });
            let instances = store.list_instances();
            (ClusterSnapshot { hosts, instances }, allowed)
        };
        match self.threshold.indicate(&snapshot) {
            ThresholdVerdict::Overload { host, extra } => {
                if self.config.enable_balancer {
                    self.balancer.balance(&snapshot, &host, &extra)?;
                }
            }
            ThresholdVerdict::Balanced { extra } => {
                if self.config.enable_underload {
                    self.underload.indicate(&allowed, &extra)?;
                }
            }
        }
        Ok(())
    }

    /// Advance tick for hosts in `suspending`.
    pub fn advance_suspensions(&self) {
        if let Err(err) = self.underload.advance_suspending() {
            warn!("suspension advance tick failed: {}", err);
        }
    }

    /// Prunes statistics samples older than `utc_offset + ttl` seconds.
    pub fn clear_compute_stats(&self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(self.config.utc_offset + self.config.ttl);
        self.store.borrow_mut().clear_stats_before(cutoff);
        debug!("compute stats cleared");
    }

    /// Drives the three recurring tasks at their configured intervals until
    /// the shutdown flag is raised. The flag is checked between tasks, so
    /// cancellation is tick-granular.
    pub fn run(&self, shutdown: &AtomicBool) {
        let mut next_balance = Instant::now();
        let mut next_advance = Instant::now();
        let mut next_clear = Instant::now();
        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= next_balance {
                self.indicate_threshold();
                next_balance = now + Duration::from_secs_f64(self.config.balance_interval);
            }
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            if now >= next_advance {
                self.advance_suspensions();
                next_advance = now + Duration::from_secs_f64(self.config.migration_check_interval);
            }
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            if now >= next_clear {
                self.clear_compute_stats(Utc::now());
                next_clear = now + Duration::from_secs_f64(self.config.clear_stats_interval);
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    pub fn underload(&self) -> &dyn UnderloadStrategy {
        self.underload.as_ref()
    }

    pub fn balancer(&self) -> &dyn BalancerStrategy {
        self.balancer.as_ref()
    }
}
