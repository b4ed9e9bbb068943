//! Filter on actually available host memory.

use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// Admits hosts with enough free memory for the instance's resident set,
/// measured from real usage rather than allocations.
#[derive(Default)]
pub struct RealRamFilter;

impl HostFilter for RealRamFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        host.memory_total.saturating_sub(host.memory_used) >= props.instance_resources.memory
    }
}
