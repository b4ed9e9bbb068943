//! Filter on declared host capabilities.

use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// Admits hosts whose declared capabilities are a superset of what the
/// instance requires.
#[derive(Default)]
pub struct ComputeCapabilitiesFilter;

impl HostFilter for ComputeCapabilitiesFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        props
            .spec
            .required_capabilities
            .iter()
            .all(|cap| host.capabilities.contains(cap))
    }
}
