//! Wait condition helpers for CheCluster resources

use kube::runtime::wait::Condition;

use che_operator::crd::{CheCluster, ChePhase};

/// CheCluster holds the given finalizer
pub fn has_finalizer(finalizer: &str) -> impl Condition<CheCluster> {
    let finalizer = finalizer.to_string();
    move |obj: Option<&CheCluster>| {
        obj.and_then(|c| c.metadata.finalizers.as_ref())
            .is_some_and(|f| f.iter().any(|x| *x == finalizer))
    }
}

/// CheCluster running phase equals `expected`
pub fn is_phase(expected: ChePhase) -> impl Condition<CheCluster> {
    move |obj: Option<&CheCluster>| {
        obj.and_then(|c| c.status.as_ref())
            .and_then(|s| s.che_cluster_running.as_ref())
            .is_some_and(|p| *p == expected)
    }
}

/// Status carries a credentials secret reference
pub fn has_credentials_secret() -> impl Condition<CheCluster> {
    |obj: Option<&CheCluster>| {
        obj.and_then(|c| c.status.as_ref())
            .and_then(|s| s.credentials_secret_ref.as_ref())
            .is_some()
    }
}

/// Status surfaces a failure with the given reason
pub fn has_failure_reason(expected: &str) -> impl Condition<CheCluster> {
    let expected = expected.to_string();
    move |obj: Option<&CheCluster>| {
        obj.and_then(|c| c.status.as_ref())
            .and_then(|s| s.reason.as_ref())
            .is_some_and(|r| *r == expected)
    }
}

/// Object no longer exists
pub fn is_gone() -> impl Condition<CheCluster> {
    |obj: Option<&CheCluster>| obj.is_none()
}
