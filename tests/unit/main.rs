//! Unit tests for the CheCluster operator.
//!
//! These run without a cluster: resource builders, exposure selection,
//! RBAC naming, and the generated server configuration.

#[path = "../common/mod.rs"]
mod common;

mod exposure;
mod rbac;
mod resources;
mod server_config;
