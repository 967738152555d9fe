//! Blueprint builders for every Kubernetes object the operator manages.

pub mod common;
pub mod exposure;
pub mod keycloak;
pub mod postgres;
pub mod rbac;
pub mod registry;
pub mod server;
pub mod tls;
