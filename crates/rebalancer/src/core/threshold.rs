//! Overload detection strategies.

use std::rc::Rc;

use log::debug;

use crate::core::config::LoadBalancerConfig;
use crate::core::metrics::{calculate_sd, host_loads_from_nodes};
use crate::core::stats::{HostStats, InstanceStats};

/// Point-in-time view of the cluster handed to the strategies: allowed
/// active hosts and every instance sample bound to them.
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    pub hosts: Vec<HostStats>,
    pub instances: Vec<InstanceStats>,
}

/// Cluster-level numbers every verdict carries; the underload controller
/// consumes the means on the no-event path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExtraInfo {
    pub cpu_overload: bool,
    pub cpu_mean: f64,
    pub ram_mean: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ThresholdVerdict {
    Overload { host: String, extra: ExtraInfo },
    Balanced { extra: ExtraInfo },
}

/// Trait for implementation of threshold strategies.
///
/// The strategy decides whether some host is overloaded and, if so, which
/// host the balancer should unload first.
pub trait ThresholdStrategy {
    fn indicate(&self, snapshot: &ClusterSnapshot) -> ThresholdVerdict;
}

pub fn threshold_resolver(class_name: &str, config: Rc<LoadBalancerConfig>) -> Box<dyn ThresholdStrategy> {
    match class_name {
        "standart_deviation" => Box::new(StandardDeviation::new(config)),
        "step_threshold" => Box::new(StepThreshold::new(config)),
        _ => panic!("Can't resolve threshold class: {}", class_name),
    }
}

/// Emits an overload once the standard deviation of per-host load exceeds
/// the configured bound in either dimension. The victim is the host with
/// the highest load in the tripped dimension, ties broken by hostname.
pub struct StandardDeviation {
    config: Rc<LoadBalancerConfig>,
}

impl StandardDeviation {
    pub fn new(config: Rc<LoadBalancerConfig>) -> Self {
        Self { config }
    }
}

impl ThresholdStrategy for StandardDeviation {
    fn indicate(&self, snapshot: &ClusterSnapshot) -> ThresholdVerdict {
        let loads = host_loads_from_nodes(&snapshot.hosts);
        let (cpu_sd, cpu_mean) = calculate_sd(loads.values().map(|l| l.cpu));
        let (mem_sd, ram_mean) = calculate_sd(loads.values().map(|l| l.mem));
        debug!("cpu sd {:.4} mean {:.4}, memory sd {:.4} mean {:.4}", cpu_sd, cpu_mean, mem_sd, ram_mean);

        let cpu_overload = cpu_sd > self.config.standart_deviation_threshold_cpu;
        let overload = cpu_overload || mem_sd > self.config.standart_deviation_threshold_memory;
        if snapshot.hosts.len() <= 1 || !overload {
            return ThresholdVerdict::Balanced {
                extra: ExtraInfo {
                    cpu_overload: false,
                    cpu_mean,
                    ram_mean,
                },
            };
        }

        // loads iterate in hostname order, a strict comparison keeps the
        // lexicographically first host among ties
        let mut victim: Option<(&String, f64)> = None;
        for (host, load) in &loads {
            let value = if cpu_overload { load.cpu } else { load.mem };
            if victim.map_or(true, |(_, best)| value > best) {
                victim = Some((host, value));
            }
        }
        let (host, _) = victim.expect("overload verdict requires a non-empty cluster");
        ThresholdVerdict::Overload {
            host: host.clone(),
            extra: ExtraInfo {
                cpu_overload,
                cpu_mean,
                ram_mean,
            },
        }
    }
}

/// Emits an overload for the first host whose absolute usage exceeds the
/// configured percentage in either dimension.
pub struct StepThreshold {
    config: Rc<LoadBalancerConfig>,
}

impl StepThreshold {
    pub fn new(config: Rc<LoadBalancerConfig>) -> Self {
        Self { config }
    }
}

impl ThresholdStrategy for StepThreshold {
    fn indicate(&self, snapshot: &ClusterSnapshot) -> ThresholdVerdict {
        let loads = host_loads_from_nodes(&snapshot.hosts);
        let (_, cpu_mean) = calculate_sd(loads.values().map(|l| l.cpu));
        let (_, ram_mean) = calculate_sd(loads.values().map(|l| l.mem));

        if snapshot.hosts.len() > 1 {
            for node in &snapshot.hosts {
                let memory_used_percent =
                    (node.memory_used as f64 / node.memory_total.max(1) as f64 * 100.).round();
                let cpu_overload = node.cpu_used_percent > self.config.cpu_threshold;
                if cpu_overload || memory_used_percent > self.config.memory_threshold {
                    return ThresholdVerdict::Overload {
                        host: node.hypervisor_hostname.clone(),
                        extra: ExtraInfo {
                            cpu_overload,
                            cpu_mean,
                            ram_mean,
                        },
                    };
                }
            }
        }
        ThresholdVerdict::Balanced {
            extra: ExtraInfo {
                cpu_overload: false,
                cpu_mean,
                ram_mean,
            },
        }
    }
}
