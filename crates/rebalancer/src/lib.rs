//! A control plane that rebalances virtual machines across a pool of
//! hypervisor hosts and powers hosts down when the cluster is globally
//! under-utilised.
//!
//! The crate sits beside a compute orchestrator: it reads per-host and
//! per-VM statistics, decides when and what to migrate, and issues
//! live-migration and host power commands through the narrow contracts in
//! [`core::compute_api`]. The periodic driver lives in [`core::manager`].

pub mod core;
