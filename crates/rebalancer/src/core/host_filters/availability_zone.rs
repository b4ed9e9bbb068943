//! Filter keeping the instance inside its availability zone.

use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// Admits hosts whose availability zone equals the instance's zone. An
/// instance without a zone constraint passes everywhere.
#[derive(Default)]
pub struct AvailabilityZoneFilter;

impl HostFilter for AvailabilityZoneFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        match &props.spec.availability_zone {
            Some(zone) => &host.az == zone,
            None => true,
        }
    }
}
