//! Early CheCluster spec checks, run before any object is created.
//!
//! A failed check is surfaced on the CR status and not retried until the
//! spec changes; half-deploying a misconfigured cluster is worse than
//! rejecting it outright.

use crate::controller::error::{Error, Result};
use crate::crd::CheCluster;
use crate::resources::exposure::{MULTI_HOST, SINGLE_HOST};

/// Documentation pointer surfaced with the ingress-domain failure
pub const INGRESS_DOMAIN_HELP: &str =
    "https://www.eclipse.org/che/docs/che-7/installing-che-on-kubernetes/";

const PVC_STRATEGIES: &[&str] = &["common", "unique", "per-workspace"];

pub fn validate(cluster: &CheCluster, is_openshift: bool) -> Result<()> {
    let spec = &cluster.spec;

    // OpenShift routers assign hosts; plain Kubernetes has no equivalent
    if !is_openshift
        && spec
            .k8s
            .ingress_domain
            .as_deref()
            .map_or(true, |d| d.is_empty())
    {
        return Err(Error::ValidationError(
            "k8s.ingressDomain must be set on Kubernetes clusters".to_string(),
        ));
    }

    let strategy = spec.server.server_exposure_strategy.as_str();
    if strategy != MULTI_HOST && strategy != SINGLE_HOST {
        return Err(Error::ValidationError(format!(
            "unknown serverExposureStrategy {strategy:?}, expected {MULTI_HOST:?} or {SINGLE_HOST:?}"
        )));
    }

    let pvc_strategy = spec.storage.pvc_strategy.as_str();
    if !PVC_STRATEGIES.contains(&pvc_strategy) {
        return Err(Error::ValidationError(format!(
            "unknown pvcStrategy {pvc_strategy:?}, expected one of {PVC_STRATEGIES:?}"
        )));
    }

    if spec.database.external_db {
        for (value, field) in [
            (&spec.database.che_postgres_host_name, "chePostgresHostName"),
            (&spec.database.che_postgres_port, "chePostgresPort"),
        ] {
            if value.as_deref().map_or(true, |v| v.is_empty()) {
                return Err(Error::ValidationError(format!(
                    "externalDb requires database.{field}"
                )));
            }
        }
    }

    if spec.auth.external_identity_provider
        && spec
            .auth
            .identity_provider_url
            .as_deref()
            .map_or(true, |u| u.is_empty())
    {
        return Err(Error::ValidationError(
            "externalIdentityProvider requires auth.identityProviderURL".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::CheClusterSpec;
    use kube::core::ObjectMeta;

    fn cluster_with(f: impl FnOnce(&mut CheClusterSpec)) -> CheCluster {
        let mut spec = CheClusterSpec::default();
        f(&mut spec);
        CheCluster {
            metadata: ObjectMeta {
                name: Some("eclipse-che".to_string()),
                namespace: Some("eclipse-che".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn kubernetes_without_ingress_domain_is_rejected() {
        let cluster = cluster_with(|_| {});
        assert!(validate(&cluster, false).is_err());
        assert!(validate(&cluster, true).is_ok());
    }

    #[test]
    fn ingress_domain_satisfies_kubernetes() {
        let cluster = cluster_with(|s| s.k8s.ingress_domain = Some("192.168.99.1.nip.io".into()));
        assert!(validate(&cluster, false).is_ok());
    }

    #[test]
    fn unknown_exposure_strategy_is_rejected() {
        let cluster = cluster_with(|s| {
            s.server.server_exposure_strategy = "default-host".to_string();
        });
        let err = validate(&cluster, true).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn external_db_requires_endpoint() {
        let cluster = cluster_with(|s| s.database.external_db = true);
        assert!(validate(&cluster, true).is_err());

        let cluster = cluster_with(|s| {
            s.database.external_db = true;
            s.database.che_postgres_host_name = Some("db.example.com".into());
            s.database.che_postgres_port = Some("5432".into());
        });
        assert!(validate(&cluster, true).is_ok());
    }
}
