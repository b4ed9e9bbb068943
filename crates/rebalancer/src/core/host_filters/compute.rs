//! Filter on compute service liveness.

use crate::core::common::SuspendState;
use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// Admits powered-on hosts whose compute service is up and not disabled.
/// Hosts being drained (`suspending`) are never admitted as destinations.
#[derive(Default)]
pub struct ComputeFilter;

impl HostFilter for ComputeFilter {
    fn host_passes(&self, host: &HostStats, _props: &FilterProperties) -> bool {
        host.suspend_state == SuspendState::Active && host.service_up && !host.service_disabled
    }
}
