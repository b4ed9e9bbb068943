//! Shared load math: min-max normalisation, weighted ordering, population
//! standard deviation and per-instance CPU accounting.
//!
//! Both the threshold and the balancer paths go through this module so that
//! their numbers agree bit-for-bit.

use std::collections::BTreeMap;

use crate::core::stats::{HostStats, InstanceStats};

/// Resource usage of one instance: CPU fraction, resident memory in MB and
/// I/O operations since the previous sample.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceMetrics {
    pub uuid: String,
    pub cpu: f64,
    pub memory: f64,
    pub io: f64,
}

/// Linear combination coefficients. Negative weights are legal: the caller
/// flips a sign to reverse the preference on that column.
#[derive(Clone, Copy, Debug)]
pub struct MetricWeights {
    pub cpu: f64,
    pub memory: f64,
    pub io: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeighedInstance {
    pub uuid: String,
    pub weight: f64,
}

/// Normalised per-host load in both dimensions, values in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HostLoad {
    pub cpu: f64,
    pub mem: f64,
}

/// Min-max normalisation of every column except the key. A single-row
/// population and a column with zero spread are treated as spread 1, which
/// maps every such value to 0.
pub fn normalize_instances(rows: &[InstanceMetrics]) -> Vec<InstanceMetrics> {
    let mut normalized = Vec::with_capacity(rows.len());
    if rows.is_empty() {
        return normalized;
    }
    let mut min = [f64::MAX; 3];
    let mut max = [f64::MIN; 3];
    for row in rows {
        for (col, value) in [row.cpu, row.memory, row.io].into_iter().enumerate() {
            min[col] = min[col].min(value);
            max[col] = max[col].max(value);
        }
    }
    let spread = |col: usize| {
        if rows.len() == 1 || max[col] == min[col] {
            1.
        } else {
            max[col] - min[col]
        }
    };
    for row in rows {
        normalized.push(InstanceMetrics {
            uuid: row.uuid.clone(),
            cpu: (row.cpu - min[0]) / spread(0),
            memory: (row.memory - min[1]) / spread(1),
            io: (row.io - min[2]) / spread(2),
        });
    }
    normalized
}

/// Weighted sum per row, returned sorted ascending by weight. The sort is
/// stable, equal weights keep their input order.
pub fn weigh_instances(rows: &[InstanceMetrics], weights: &MetricWeights) -> Vec<WeighedInstance> {
    let mut weighed: Vec<WeighedInstance> = rows
        .iter()
        .map(|row| WeighedInstance {
            uuid: row.uuid.clone(),
            weight: weights.cpu * row.cpu + weights.memory * row.memory + weights.io * row.io,
        })
        .collect();
    weighed.sort_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal));
    weighed
}

/// Population standard deviation and mean. An empty population yields
/// `(0, 0)` before any division takes place.
pub fn calculate_sd<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return (0., 0.);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variation = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (variation.sqrt(), mean)
}

/// Instantaneous CPU fraction of one sample, per vCPU, clamped into [0, 1]
/// and rounded to 0.01. A sample with a zero or regressed `prev_cpu_time`,
/// a missing `updated_at` or a zero time delta is stale and reads as 0.
pub fn calculate_cpu(instance: &InstanceStats) -> f64 {
    if instance.prev_cpu_time == 0 || instance.prev_cpu_time > instance.cpu_time {
        return 0.;
    }
    let updated_at = match instance.updated_at {
        Some(t) => t,
        None => return 0.,
    };
    let prev_updated_at = instance.prev_updated_at.unwrap_or(instance.created_at);
    let delta_time = (updated_at - prev_updated_at).num_seconds();
    if delta_time <= 0 {
        return 0.;
    }
    let delta_cpu_time = (instance.cpu_time - instance.prev_cpu_time) as f64;
    let load = delta_cpu_time / (delta_time as f64 * 1e7 * instance.vcpus.max(1) as f64);
    (load.clamp(0., 1.) * 100.).round() / 100.
}

/// Resource row of one instance for selection purposes.
pub fn instance_metrics(instance: &InstanceStats) -> InstanceMetrics {
    InstanceMetrics {
        uuid: instance.instance_uuid.clone(),
        cpu: calculate_cpu(instance),
        memory: instance.mem as f64,
        io: instance.block_dev_iops.saturating_sub(instance.prev_block_dev_iops) as f64,
    }
}

/// Host loads from the latest node statistics: memory used over capacity
/// and CPU percent over 100. This is what the threshold detector and the
/// underload check consume.
pub fn host_loads_from_nodes(nodes: &[HostStats]) -> BTreeMap<String, HostLoad> {
    nodes
        .iter()
        .map(|node| {
            (
                node.hypervisor_hostname.clone(),
                HostLoad {
                    cpu: node.cpu_used_percent / 100.,
                    mem: node.memory_used as f64 / node.memory_total.max(1) as f64,
                },
            )
        })
        .collect()
}

/// Host loads as the sum of per-instance consumption: resident memory over
/// host capacity and the sum of per-vCPU fractions. The balancer evaluates
/// hypothetical post-migration states on this projection, where moving a
/// single instance is visible.
pub fn host_loads_from_instances(
    nodes: &[HostStats],
    instances: &[InstanceStats],
) -> BTreeMap<String, HostLoad> {
    let mut loads: BTreeMap<String, HostLoad> = nodes
        .iter()
        .map(|node| (node.hypervisor_hostname.clone(), HostLoad::default()))
        .collect();
    for instance in instances {
        if let Some(load) = loads.get_mut(&instance.host) {
            load.cpu += calculate_cpu(instance);
            load.mem += instance.mem as f64;
        }
    }
    for node in nodes {
        if let Some(load) = loads.get_mut(&node.hypervisor_hostname) {
            load.mem /= node.memory_total.max(1) as f64;
        }
    }
    loads
}
