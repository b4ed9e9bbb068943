//! Filter bounding concurrent migrations per host.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;

use crate::core::compute_api::ComputeApi;
use crate::core::host_filter::{FilterProperties, HostFilter};
use crate::core::stats::HostStats;

/// Admits a destination only while both the source host and the destination
/// itself have at most `max_migrations` migrations in progress. A failing
/// migration-log query rejects the host, the next tick retries.
pub struct MaxMigrationsFilter {
    compute: Rc<RefCell<dyn ComputeApi>>,
    max_migrations: usize,
}

impl MaxMigrationsFilter {
    pub fn new(compute: Rc<RefCell<dyn ComputeApi>>, max_migrations: usize) -> Self {
        Self {
            compute,
            max_migrations,
        }
    }

    fn within_cap(&self, host: &str) -> bool {
        match self.compute.borrow().migrations_in_progress(host) {
            Ok(migrations) => {
                migrations.iter().filter(|m| m.status.in_progress()).count() <= self.max_migrations
            }
            Err(err) => {
                warn!("migration log query for host {} failed: {}", host, err);
                false
            }
        }
    }
}

impl HostFilter for MaxMigrationsFilter {
    fn host_passes(&self, host: &HostStats, props: &FilterProperties) -> bool {
        if let Some(source) = &props.source_host {
            if !self.within_cap(source) {
                return false;
            }
        }
        self.within_cap(&host.hypervisor_hostname)
    }
}
