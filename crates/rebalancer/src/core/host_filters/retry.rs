//! Filter rejecting hosts already tried for this request.

use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

#[derive(Default)]
pub struct RetryFilter;

impl HostFilter for RetryFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        !props.retry_hosts.iter().any(|h| h == &host.hypervisor_hostname)
    }
}
