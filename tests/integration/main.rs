//! Integration tests for the CheCluster operator.
//!
//! These tests require a running Kubernetes cluster accessible via
//! kubeconfig. They are marked with #[ignore] and must be run explicitly:
//!
//! ```bash
//! cargo test --test integration -- --ignored --test-threads=1
//! ```
//!
//! The tests exercise operator logic only: they verify the objects the
//! operator creates and the status it writes, and never wait for container
//! images to pull or pods to become ready.

#[path = "../common/mod.rs"]
mod common;

mod crd;
mod namespace;
mod operator;
mod tests;
mod wait;

pub use crd::*;
pub use namespace::*;
pub use operator::*;
pub use wait::*;
