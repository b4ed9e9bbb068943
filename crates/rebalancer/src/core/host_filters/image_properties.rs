//! Filter on image/host hypervisor compatibility.

use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// Admits hosts able to run the instance's image: an image constrained to a
/// hypervisor type only runs on hosts of that type. Unconstrained images
/// pass everywhere.
#[derive(Default)]
pub struct ImagePropertiesFilter;

impl HostFilter for ImagePropertiesFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        match &props.spec.image_properties.hypervisor_type {
            Some(hypervisor_type) => &host.hypervisor_type == hypervisor_type,
            None => true,
        }
    }
}
