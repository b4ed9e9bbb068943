//! Load balancer configuration.

use serde::{Deserialize, Serialize};

/// Auxiliary structure to parse LoadBalancerConfig from file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct LoadBalancerConfigRaw {
    /// turn the overload balancing mechanism on or off
    pub enable_balancer: Option<bool>,
    /// turn the underload (host suspension) mechanism on or off
    pub enable_underload: Option<bool>,
    /// threshold strategy name
    pub threshold_class: Option<String>,
    /// balancer strategy name
    pub balancer_class: Option<String>,
    /// underload strategy name
    pub underload_class: Option<String>,
    /// overload trigger on the SD of per-host CPU load
    pub standart_deviation_threshold_cpu: Option<f64>,
    /// overload trigger on the SD of per-host memory load
    pub standart_deviation_threshold_memory: Option<f64>,
    /// step threshold on CPU usage, percent
    pub cpu_threshold: Option<f64>,
    /// step threshold on memory usage, percent
    pub memory_threshold: Option<f64>,
    /// per-host CPU load below which a host qualifies for suspension
    pub threshold_cpu: Option<f64>,
    /// per-host memory load below which a host qualifies for suspension
    pub threshold_memory: Option<f64>,
    /// cluster CPU mean above which a suspended host is woken
    pub unsuspend_cpu: Option<f64>,
    /// cluster memory mean above which a suspended host is woken
    pub unsuspend_memory: Option<f64>,
    /// instance selection weights
    pub cpu_weight: Option<f64>,
    pub memory_weight: Option<f64>,
    pub io_weight: Option<f64>,
    /// destination score weights for the two SD terms
    pub compute_cpu_weight: Option<f64>,
    pub compute_memory_weight: Option<f64>,
    /// host filter names applied before destination selection
    pub load_balancer_default_filters: Option<Vec<String>>,
    /// cap on in-progress migrations per host
    pub max_migrations: Option<usize>,
    /// UTC offset in seconds used by the stats GC cutoff
    pub utc_offset: Option<i64>,
    /// time to live of statistics samples in seconds
    pub ttl: Option<i64>,
    /// rebalance tick period in seconds
    pub balance_interval: Option<f64>,
    /// in-flight suspension check period in seconds
    pub migration_check_interval: Option<f64>,
    /// stats GC period in seconds
    pub clear_stats_interval: Option<f64>,
}

/// Control plane configuration. Threaded through the driver as an immutable
/// value so that test fixtures can supply alternatives.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct LoadBalancerConfig {
    pub enable_balancer: bool,
    pub enable_underload: bool,
    pub threshold_class: String,
    pub balancer_class: String,
    pub underload_class: String,
    pub standart_deviation_threshold_cpu: f64,
    pub standart_deviation_threshold_memory: f64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub threshold_cpu: f64,
    pub threshold_memory: f64,
    pub unsuspend_cpu: f64,
    pub unsuspend_memory: f64,
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub io_weight: f64,
    pub compute_cpu_weight: f64,
    pub compute_memory_weight: f64,
    pub load_balancer_default_filters: Vec<String>,
    pub max_migrations: usize,
    pub utc_offset: i64,
    pub ttl: i64,
    pub balance_interval: f64,
    pub migration_check_interval: f64,
    pub clear_stats_interval: f64,
}

impl LoadBalancerConfig {
    /// Creates config with default parameter values.
    pub fn new() -> Self {
        Self {
            enable_balancer: true,
            enable_underload: false,
            threshold_class: "standart_deviation".to_string(),
            balancer_class: "minimize_sd".to_string(),
            underload_class: "mean_underload".to_string(),
            standart_deviation_threshold_cpu: 0.05,
            standart_deviation_threshold_memory: 0.3,
            cpu_threshold: 70.,
            memory_threshold: 70.,
            threshold_cpu: 0.05,
            threshold_memory: 0.05,
            unsuspend_cpu: 0.4,
            unsuspend_memory: 0.4,
            cpu_weight: 1.,
            memory_weight: 1.,
            io_weight: 1.,
            compute_cpu_weight: 1.,
            compute_memory_weight: 1.,
            load_balancer_default_filters: vec![
                "Retry".to_string(),
                "AvailabilityZone".to_string(),
                "RealRam".to_string(),
                "Compute".to_string(),
                "ComputeCapabilities".to_string(),
                "ImageProperties".to_string(),
                "ServerGroupAntiAffinity".to_string(),
                "ServerGroupAffinity".to_string(),
                "MaxMigrations".to_string(),
            ],
            max_migrations: 10,
            utc_offset: 10800,
            ttl: 300,
            balance_interval: 60.,
            migration_check_interval: 30.,
            clear_stats_interval: 300.,
        }
    }

    /// Creates config by reading parameter values from .yaml file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        Self::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
    }

    /// Creates config from a YAML string with defaults for absent keys.
    pub fn from_str(content: &str) -> Self {
        let data: LoadBalancerConfigRaw =
            serde_yaml::from_str(content).unwrap_or_else(|err| panic!("Can't parse YAML config: {}", err));
        let default = LoadBalancerConfig::new();
        Self {
            enable_balancer: data.enable_balancer.unwrap_or(default.enable_balancer),
            enable_underload: data.enable_underload.unwrap_or(default.enable_underload),
            threshold_class: data.threshold_class.unwrap_or(default.threshold_class),
            balancer_class: data.balancer_class.unwrap_or(default.balancer_class),
            underload_class: data.underload_class.unwrap_or(default.underload_class),
            standart_deviation_threshold_cpu: data
                .standart_deviation_threshold_cpu
                .unwrap_or(default.standart_deviation_threshold_cpu),
            standart_deviation_threshold_memory: data
                .standart_deviation_threshold_memory
                .unwrap_or(default.standart_deviation_threshold_memory),
            cpu_threshold: data.cpu_threshold.unwrap_or(default.cpu_threshold),
            memory_threshold: data.memory_threshold.unwrap_or(default.memory_threshold),
            threshold_cpu: data.threshold_cpu.unwrap_or(default.threshold_cpu),
            threshold_memory: data.threshold_memory.unwrap_or(default.threshold_memory),
            unsuspend_cpu: data.unsuspend_cpu.unwrap_or(default.unsuspend_cpu),
            unsuspend_memory: data.unsuspend_memory.unwrap_or(default.unsuspend_memory),
            cpu_weight: data.cpu_weight.unwrap_or(default.cpu_weight),
            memory_weight: data.memory_weight.unwrap_or(default.memory_weight),
            io_weight: data.io_weight.unwrap_or(default.io_weight),
            compute_cpu_weight: data.compute_cpu_weight.unwrap_or(default.compute_cpu_weight),
            compute_memory_weight: data.compute_memory_weight.unwrap_or(default.compute_memory_weight),
            load_balancer_default_filters: data
                .load_balancer_default_filters
                .unwrap_or(default.load_balancer_default_filters),
            max_migrations: data.max_migrations.unwrap_or(default.max_migrations),
            utc_offset: data.utc_offset.unwrap_or(default.utc_offset),
            ttl: data.ttl.unwrap_or(default.ttl),
            balance_interval: data.balance_interval.unwrap_or(default.balance_interval),
            migration_check_interval: data
                .migration_check_interval
                .unwrap_or(default.migration_check_interval),
            clear_stats_interval: data.clear_stats_interval.unwrap_or(default.clear_stats_interval),
        }
    }
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self::new()
    }
}
