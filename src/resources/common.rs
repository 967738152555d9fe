//! Shared constants and helpers for Kubernetes resource generation.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::CheCluster;

/// API version of the CheCluster CRD
pub const API_VERSION: &str = "org.eclipse.che/v1";

/// Kind of the CheCluster CRD
pub const KIND: &str = "CheCluster";

/// Field manager name for patches issued by the operator
pub const FIELD_MANAGER: &str = "che-operator";

/// Label stamped on everything the operator manages
pub const PART_OF: &str = "che.eclipse.org";

/// Finalizer bound to the cluster-scoped OAuthClient object
pub const OAUTH_CLIENT_FINALIZER: &str = "oauthclients.finalizers.che.eclipse.org";

/// Finalizer bound to the initial HTPasswd user artifacts
pub const OPENSHIFT_OAUTH_USER_FINALIZER: &str = "openshift-oauth-user.finalizers.che.eclipse.org";

/// Finalizer bound to the broad workspace cluster roles/bindings
pub const CLUSTER_PERMISSIONS_FINALIZER: &str =
    "cheWorkspaces.clusterpermissions.finalizers.che.eclipse.org";

/// Finalizer bound to the namespace-creation cluster role/binding
pub const NAMESPACES_EDITOR_FINALIZER: &str =
    "namespaces-editor.permissions.finalizers.che.eclipse.org";

/// Finalizer bound to the gateway permission objects
pub const GATEWAY_PERMISSIONS_FINALIZER: &str =
    "cheGateway.clusterpermissions.finalizers.che.eclipse.org";

/// All finalizers the reconciler may add; removal order follows this list
pub const ALL_FINALIZERS: &[&str] = &[
    OAUTH_CLIENT_FINALIZER,
    OPENSHIFT_OAUTH_USER_FINALIZER,
    CLUSTER_PERMISSIONS_FINALIZER,
    NAMESPACES_EDITOR_FINALIZER,
    GATEWAY_PERMISSIONS_FINALIZER,
];

/// Generate an owner reference to the CheCluster.
///
/// Namespaced child objects carry this so Kubernetes garbage collection
/// removes them with the CR. Cluster-scoped objects cannot reference a
/// namespaced owner and are cleaned up by finalizers instead.
pub fn owner_reference(cluster: &CheCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Standard labels for a component of the platform
pub fn component_labels(cluster: &CheCluster, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), cluster.spec.server.che_flavor.clone()),
        ("component".to_string(), component.to_string()),
        (
            "app.kubernetes.io/name".to_string(),
            component.to_string(),
        ),
        (
            "app.kubernetes.io/part-of".to_string(),
            PART_OF.to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
    ])
}

/// Selector labels for a component's pods
pub fn selector_labels(cluster: &CheCluster, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), cluster.spec.server.che_flavor.clone()),
        ("component".to_string(), component.to_string()),
    ])
}
