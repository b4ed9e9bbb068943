//! Host filter chain applied before destination selection.
//!
//! A host survives iff every predicate of the chain admits it. Predicates
//! are pluggable by name through [`host_filter_resolver`]; the shipped set
//! lives in [`crate::core::host_filters`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::compute_api::{ComputeApi, InstanceSpec};
use crate::core::config::LoadBalancerConfig;
use crate::core::host_filters::availability_zone::AvailabilityZoneFilter;
use crate::core::host_filters::compute::ComputeFilter;
use crate::core::host_filters::compute_capabilities::ComputeCapabilitiesFilter;
use crate::core::host_filters::image_properties::ImagePropertiesFilter;
use crate::core::host_filters::max_migrations::MaxMigrationsFilter;
use crate::core::host_filters::real_ram::RealRamFilter;
use crate::core::host_filters::retry::RetryFilter;
use crate::core::host_filters::server_group_affinity::ServerGroupAffinityFilter;
use crate::core::host_filters::server_group_anti_affinity::ServerGroupAntiAffinityFilter;
use crate::core::stats::HostStats;

/// Unnormalised resource usage of the instance being placed.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceResources {
    pub uuid: String,
    /// CPU fraction per vCPU, in [0, 1].
    pub cpu: f64,
    /// Resident memory in MB.
    pub memory: u64,
    pub io: f64,
}

/// Inputs of one filter chain run.
#[derive(Clone, Debug)]
pub struct FilterProperties {
    pub spec: InstanceSpec,
    pub instance_resources: InstanceResources,
    pub source_host: Option<String>,
    /// Hosts already tried for this request, never admitted again.
    pub retry_hosts: Vec<String>,
}

/// Trait for implementation of host filters.
///
/// A filter is defined as a predicate over one candidate host and the
/// properties of the placement request. It is possible to implement an
/// arbitrary filter and resolve it by name in a custom chain.
pub trait HostFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool;
}

/// Runs the chain, keeping the hosts admitted by every filter. Output
/// preserves input order.
pub fn filter_hosts(
    hosts: Vec<HostStats>,
    props: &FilterProperties,
    filters: &[Box<dyn HostFilter>],
) -> Vec<HostStats> {
    hosts
        .into_iter()
        .filter(|host| filters.iter().all(|f| f.host_passes(host, props)))
        .collect()
}

pub fn host_filter_resolver(
    names: &[String],
    compute: Rc<RefCell<dyn ComputeApi>>,
    config: &LoadBalancerConfig,
) -> Vec<Box<dyn HostFilter>> {
    names
        .iter()
        .map(|name| match name.as_str() {
            "Retry" => Box::new(RetryFilter) as Box<dyn HostFilter>,
            "AvailabilityZone" => Box::new(AvailabilityZoneFilter),
            "RealRam" => Box::new(RealRamFilter),
            "Compute" => Box::new(ComputeFilter),
            "ComputeCapabilities" => Box::new(ComputeCapabilitiesFilter),
            "ImageProperties" => Box::new(ImagePropertiesFilter),
            "ServerGroupAntiAffinity" => Box::new(ServerGroupAntiAffinityFilter),
            "ServerGroupAffinity" => Box::new(ServerGroupAffinityFilter),
            "MaxMigrations" => Box::new(MaxMigrationsFilter::new(compute.clone(), config.max_migrations)),
            _ => panic!("Can't resolve host filter: {}", name),
        })
        .collect()
}
