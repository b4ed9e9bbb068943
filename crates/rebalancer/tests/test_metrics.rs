mod fakes;

use chrono::Duration;
use fakes::{host, instance, sample_time};
use rebalancer::core::common::VmState;
use rebalancer::core::metrics::{
    calculate_cpu, calculate_sd, host_loads_from_instances, host_loads_from_nodes,
    normalize_instances, weigh_instances, InstanceMetrics, MetricWeights,
};

fn row(uuid: &str, cpu: f64, memory: f64, io: f64) -> InstanceMetrics {
    InstanceMetrics {
        uuid: uuid.to_string(),
        cpu,
        memory,
        io,
    }
}

#[test]
fn test_normalize_empty() {
    assert!(normalize_instances(&[]).is_empty());
}

#[test]
// A population of one has no spread, every column maps to zero
fn test_normalize_single_row() {
    let normalized = normalize_instances(&[row("xxx", 0.7, 512., 100.)]);
    assert_eq!(normalized, vec![row("xxx", 0., 0., 0.)]);
}

#[test]
fn test_normalize_zero_spread_column() {
    let normalized = normalize_instances(&[row("a", 0.2, 512., 0.), row("b", 0.6, 512., 10.)]);
    // the memory column has no spread and collapses to zero
    assert_eq!(normalized[0].memory, 0.);
    assert_eq!(normalized[1].memory, 0.);
    assert_eq!(normalized[0].cpu, 0.);
    assert_eq!(normalized[1].cpu, 1.);
}

#[test]
// No output ever leaves [0, 1] or turns NaN
fn test_normalize_is_range_safe() {
    let rows = vec![
        row("a", 0.9, 4096., 5000.),
        row("b", 0.1, 128., 0.),
        row("c", 0.4, 1024., 700.),
    ];
    for normalized in normalize_instances(&rows) {
        for value in [normalized.cpu, normalized.memory, normalized.io] {
            assert!(value.is_finite());
            assert!((0. ..=1.).contains(&value));
        }
    }
}

#[test]
fn test_weigh_sorts_ascending() {
    let rows = vec![row("heavy", 1., 1., 1.), row("light", 0., 0., 0.), row("mid", 0.5, 0.2, 0.)];
    let weights = MetricWeights {
        cpu: 1.,
        memory: 1.,
        io: 1.,
    };
    let order: Vec<String> = weigh_instances(&rows, &weights).into_iter().map(|w| w.uuid).collect();
    assert_eq!(order, vec!["light", "mid", "heavy"]);
}

#[test]
// Flipping the CPU sign prefers the CPU-heaviest instance
fn test_weigh_with_negative_cpu_weight() {
    let rows = vec![row("calm", 0.1, 0., 0.), row("busy", 0.9, 0., 0.)];
    let weights = MetricWeights {
        cpu: -1.,
        memory: 1.,
        io: 1.,
    };
    let order: Vec<String> = weigh_instances(&rows, &weights).into_iter().map(|w| w.uuid).collect();
    assert_eq!(order, vec!["busy", "calm"]);
}

#[test]
fn test_sd_is_zero_safe() {
    assert_eq!(calculate_sd(Vec::<f64>::new()), (0., 0.));
    assert_eq!(calculate_sd(vec![0.7]), (0., 0.7));
    let (sd, mean) = calculate_sd(vec![0.4, 0.4, 0.4]);
    assert_eq!(sd, 0.);
    assert!((mean - 0.4).abs() < 1e-12);
}

#[test]
fn test_sd_known_population() {
    let (sd, mean) = calculate_sd(vec![0.9, 0.15]);
    assert!((mean - 0.525).abs() < 1e-12);
    assert!((sd - 0.375).abs() < 1e-12);
}

#[test]
fn test_calculate_cpu_stale_samples_read_zero() {
    let mut sample = instance("xxx", "node1", VmState::Active, 512);
    // no updated_at
    assert_eq!(calculate_cpu(&sample), 0.);

    sample.updated_at = Some(sample_time());
    sample.prev_updated_at = Some(sample_time() - Duration::seconds(10));
    sample.prev_cpu_time = 0;
    assert_eq!(calculate_cpu(&sample), 0.);

    // regressed counter
    sample.prev_cpu_time = sample.cpu_time + 1;
    assert_eq!(calculate_cpu(&sample), 0.);

    // zero time delta
    sample.prev_cpu_time = 12000000;
    sample.prev_updated_at = sample.updated_at;
    assert_eq!(calculate_cpu(&sample), 0.);
}

#[test]
fn test_calculate_cpu_rounds_and_clamps() {
    let mut sample = instance("xxx", "node1", VmState::Active, 512);
    sample.prev_cpu_time = 0;
    sample.cpu_time = 0;
    sample.updated_at = Some(sample_time());
    sample.prev_updated_at = Some(sample_time() - Duration::seconds(10));

    // 5e7 over 10 s on one vCPU is half a core
    sample.prev_cpu_time = 1;
    sample.cpu_time = 50_000_001;
    assert_eq!(calculate_cpu(&sample), 0.5);

    // 4.56e7 rounds to 0.46
    sample.cpu_time = 45_600_001;
    assert_eq!(calculate_cpu(&sample), 0.46);

    // far past the window clamps to a full core
    sample.cpu_time = 10_000_000_001;
    assert_eq!(calculate_cpu(&sample), 1.);
}

#[test]
fn test_host_loads_from_nodes() {
    let nodes = vec![
        host("node1", 1, 1, 1024, 512, 90.),
        host("node2", 2, 2, 2048, 1024, 15.),
    ];
    let loads = host_loads_from_nodes(&nodes);
    assert!((loads["node1"].cpu - 0.9).abs() < 1e-12);
    assert!((loads["node1"].mem - 0.5).abs() < 1e-12);
    assert!((loads["node2"].cpu - 0.15).abs() < 1e-12);
    assert!((loads["node2"].mem - 0.5).abs() < 1e-12);
}

#[test]
// Instance sums: memory relative to host capacity, CPU fractions added up
fn test_host_loads_from_instances() {
    let nodes = vec![
        host("node1", 1, 1, 1024, 512, 90.),
        host("node2", 2, 2, 2048, 1024, 15.),
    ];
    let instances = vec![
        instance("xxx", "node1", VmState::Active, 512),
        instance("zzz", "node1", VmState::Stopped, 512),
        instance("yyy", "node2", VmState::Active, 512),
    ];
    let loads = host_loads_from_instances(&nodes, &instances);
    assert!((loads["node1"].mem - 1.0).abs() < 1e-12);
    assert!((loads["node2"].mem - 0.25).abs() < 1e-12);
    // fixture samples carry no updated_at, their CPU fraction is stale
    assert_eq!(loads["node1"].cpu, 0.);
}
