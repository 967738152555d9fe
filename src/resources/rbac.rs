//! RBAC objects for workspaces: the narrow (namespaced) and broad
//! (cluster-wide) permission strategies, plus the TLS bootstrap job's own
//! service account.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::CheCluster;
use crate::resources::common::component_labels;

/// Service account workspaces run under (narrow strategy)
pub const WORKSPACE_SA: &str = "che-workspace";

/// Service account of the Che server, the delegate of the broad strategy
pub const CHE_SA: &str = "che";

pub const EXEC_ROLE: &str = "exec";
pub const VIEW_ROLE: &str = "view";

/// Name of the broad workspace-object ClusterRole for a given namespace
pub fn workspace_cluster_role_name(namespace: &str) -> String {
    format!("{namespace}-cheworkspaces-clusterrole")
}

/// Name of the broad namespace-creation ClusterRole for a given namespace
pub fn namespace_editor_cluster_role_name(namespace: &str) -> String {
    format!("{namespace}-cheworkspaces-namespaces-clusterrole")
}

fn meta(cluster: &CheCluster, name: &str, component: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: cluster.namespace(),
        labels: Some(component_labels(cluster, component)),
        ..Default::default()
    }
}

pub fn workspace_service_account(cluster: &CheCluster) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(cluster, WORKSPACE_SA, "workspace"),
        ..Default::default()
    }
}

/// Namespaced Role allowing `pods/exec` create (narrow strategy)
pub fn exec_role(cluster: &CheCluster) -> Role {
    Role {
        metadata: meta(cluster, EXEC_ROLE, "workspace"),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["pods/exec".to_string()]),
            verbs: vec!["create".to_string()],
            ..Default::default()
        }]),
    }
}

/// Namespaced Role allowing pod listing (narrow strategy)
pub fn view_role(cluster: &CheCluster) -> Role {
    Role {
        metadata: meta(cluster, VIEW_ROLE, "workspace"),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["pods".to_string()]),
            verbs: vec!["list".to_string()],
            ..Default::default()
        }]),
    }
}

/// Bind a namespaced Role to the workspace service account
pub fn workspace_role_binding(cluster: &CheCluster, role: &str) -> RoleBinding {
    let ns = cluster.namespace().unwrap_or_default();
    RoleBinding {
        metadata: meta(cluster, &format!("{WORKSPACE_SA}-{role}"), "workspace"),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: WORKSPACE_SA.to_string(),
            namespace: Some(ns),
            ..Default::default()
        }]),
    }
}

/// Bind the pre-existing cluster `edit` role to the Che service account via
/// a RoleBinding. Intentionally a RoleBinding, not a ClusterRoleBinding:
/// the grant is scoped to the CheCluster namespace.
pub fn che_edit_role_binding(cluster: &CheCluster) -> RoleBinding {
    let ns = cluster.namespace().unwrap_or_default();
    RoleBinding {
        metadata: meta(cluster, CHE_SA, "che"),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "edit".to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: CHE_SA.to_string(),
            namespace: Some(ns),
            ..Default::default()
        }]),
    }
}

/// Policy rules delegated to workspaces under the broad strategy. The
/// permission probe verifies the operator holds every one of these before
/// the ClusterRole is created.
pub fn workspace_cluster_role_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec![
                "pods".to_string(),
                "services".to_string(),
                "configmaps".to_string(),
                "secrets".to_string(),
                "persistentvolumeclaims".to_string(),
            ]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "watch".to_string(),
                "create".to_string(),
                "update".to_string(),
                "patch".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["pods/exec".to_string()]),
            verbs: vec!["create".to_string()],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["apps".to_string()]),
            resources: Some(vec!["deployments".to_string(), "replicasets".to_string()]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "watch".to_string(),
                "create".to_string(),
                "update".to_string(),
                "patch".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec![
                "networking.k8s.io".to_string(),
                "route.openshift.io".to_string(),
            ]),
            resources: Some(vec!["ingresses".to_string(), "routes".to_string()]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "create".to_string(),
                "update".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["rbac.authorization.k8s.io".to_string()]),
            resources: Some(vec!["roles".to_string(), "rolebindings".to_string()]),
            verbs: vec![
                "get".to_string(),
                "list".to_string(),
                "create".to_string(),
                "update".to_string(),
                "delete".to_string(),
            ],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["metrics.k8s.io".to_string()]),
            resources: Some(vec!["pods".to_string(), "nodes".to_string()]),
            verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
            ..Default::default()
        },
    ]
}

/// Policy rules for creating workspace namespaces/projects under the broad
/// strategy
pub fn namespace_editor_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["namespaces".to_string()]),
            verbs: vec!["get".to_string(), "create".to_string(), "list".to_string()],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["project.openshift.io".to_string()]),
            resources: Some(vec!["projects".to_string(), "projectrequests".to_string()]),
            verbs: vec!["get".to_string(), "create".to_string(), "list".to_string()],
            ..Default::default()
        },
    ]
}

fn cluster_scoped_meta(cluster: &CheCluster, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(component_labels(cluster, "workspace")),
        ..Default::default()
    }
}

pub fn workspace_cluster_role(cluster: &CheCluster, namespace: &str) -> ClusterRole {
    ClusterRole {
        metadata: cluster_scoped_meta(cluster, &workspace_cluster_role_name(namespace)),
        rules: Some(workspace_cluster_role_rules()),
        ..Default::default()
    }
}

pub fn namespace_editor_cluster_role(cluster: &CheCluster, namespace: &str) -> ClusterRole {
    ClusterRole {
        metadata: cluster_scoped_meta(cluster, &namespace_editor_cluster_role_name(namespace)),
        rules: Some(namespace_editor_rules()),
        ..Default::default()
    }
}

/// Bind a broad ClusterRole to the Che service account
pub fn cluster_role_binding(cluster: &CheCluster, role_name: &str) -> ClusterRoleBinding {
    let ns = cluster.namespace().unwrap_or_default();
    ClusterRoleBinding {
        metadata: cluster_scoped_meta(cluster, role_name),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: CHE_SA.to_string(),
            namespace: Some(ns),
            ..Default::default()
        }]),
    }
}

/// Service account the TLS bootstrap job runs under
pub const TLS_JOB_SA: &str = "che-tls-job-service-account";
pub const TLS_JOB_ROLE: &str = "che-tls-job-role";
pub const TLS_JOB_ROLE_BINDING: &str = "che-tls-job-role-binding";

pub fn tls_job_service_account(cluster: &CheCluster) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(cluster, TLS_JOB_SA, "che-create-tls-secret-job"),
        ..Default::default()
    }
}

/// The TLS job only needs to create secrets in the CheCluster namespace
pub fn tls_job_role(cluster: &CheCluster) -> Role {
    Role {
        metadata: meta(cluster, TLS_JOB_ROLE, "che-create-tls-secret-job"),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["secrets".to_string()]),
            verbs: vec!["create".to_string()],
            ..Default::default()
        }]),
    }
}

pub fn tls_job_role_binding(cluster: &CheCluster) -> RoleBinding {
    let ns = cluster.namespace().unwrap_or_default();
    RoleBinding {
        metadata: meta(cluster, TLS_JOB_ROLE_BINDING, "che-create-tls-secret-job"),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: TLS_JOB_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: TLS_JOB_SA.to_string(),
            namespace: Some(ns),
            ..Default::default()
        }]),
    }
}
