//! CheCluster fixtures for tests.
//!
//! Most tests start from `test_cluster` and mutate the spec through
//! `test_cluster_with`; the fixture carries a uid so generated owner
//! references are complete.

use kube::core::ObjectMeta;

use che_operator::crd::{CheCluster, CheClusterSpec};

pub const TEST_NAMESPACE: &str = "eclipse-che";
pub const TEST_UID: &str = "test-uid-12345";

/// A minimal CheCluster the way a user would create it on OpenShift:
/// every spec section left at its defaults.
pub fn test_cluster(name: &str, namespace: &str) -> CheCluster {
    CheCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(TEST_UID.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: CheClusterSpec::default(),
        status: None,
    }
}

/// Default cluster with spec tweaks applied
pub fn test_cluster_with(f: impl FnOnce(&mut CheClusterSpec)) -> CheCluster {
    let mut cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    f(&mut cluster.spec);
    cluster
}

/// Cluster as it would look on plain Kubernetes: TLS off by default but an
/// ingress domain always present.
pub fn k8s_cluster(domain: &str) -> CheCluster {
    test_cluster_with(|spec| {
        spec.k8s.ingress_domain = Some(domain.to_string());
    })
}
