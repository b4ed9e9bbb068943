//! Filter enforcing server group affinity.

use crate::core::compute_api::ServerGroupPolicy;
use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// For an affinity group, admits only the host every other group member
/// already runs on. Instances without an affinity group pass everywhere.
#[derive(Default)]
pub struct ServerGroupAffinityFilter;

impl HostFilter for ServerGroupAffinityFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        match &props.spec.server_group {
            Some(group) if group.policy == ServerGroupPolicy::Affinity => group
                .member_hosts
                .iter()
                .all(|member| member == &host.hypervisor_hostname),
            _ => true,
        }
    }
}
