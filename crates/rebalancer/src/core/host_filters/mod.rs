pub mod availability_zone;
pub mod compute;
pub mod compute_capabilities;
pub mod image_properties;
pub mod max_migrations;
pub mod real_ram;
pub mod retry;
pub mod server_group_affinity;
pub mod server_group_anti_affinity;
