//! Filter enforcing server group anti-affinity.

use crate::core::compute_api::ServerGroupPolicy;
use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// For an anti-affinity group, rejects hosts already running a member of
/// the group.
#[derive(Default)]
pub struct ServerGroupAntiAffinityFilter;

impl HostFilter for ServerGroupAntiAffinityFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        match &props.spec.server_group {
            Some(group) if group.policy == ServerGroupPolicy::AntiAffinity => {
                !group.member_hosts.contains(&host.hypervisor_hostname)
            }
            _ => true,
        }
    }
}
