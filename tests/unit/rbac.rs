//! Unit tests for the RBAC object builders.

use crate::common::{test_cluster, TEST_NAMESPACE};
use che_operator::resources::rbac;

#[test]
fn cluster_role_names_embed_the_namespace() {
    assert_eq!(
        rbac::workspace_cluster_role_name("eclipse-che"),
        "eclipse-che-cheworkspaces-clusterrole"
    );
    assert_eq!(
        rbac::namespace_editor_cluster_role_name("eclipse-che"),
        "eclipse-che-cheworkspaces-namespaces-clusterrole"
    );
}

#[test]
fn exec_role_only_grants_pod_exec() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let role = rbac::exec_role(&cluster);
    let rules = role.rules.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules[0].resources.as_deref(),
        Some(&["pods/exec".to_string()][..])
    );
    assert_eq!(rules[0].verbs, vec!["create".to_string()]);
}

#[test]
fn workspace_role_bindings_target_the_workspace_service_account() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let binding = rbac::workspace_role_binding(&cluster, rbac::EXEC_ROLE);
    assert_eq!(binding.metadata.name.as_deref(), Some("che-workspace-exec"));
    let subject = &binding.subjects.unwrap()[0];
    assert_eq!(subject.kind, "ServiceAccount");
    assert_eq!(subject.name, rbac::WORKSPACE_SA);
    assert_eq!(binding.role_ref.name, rbac::EXEC_ROLE);
}

#[test]
fn cluster_role_binding_subject_is_the_operator_service_account() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let role_name = rbac::workspace_cluster_role_name(TEST_NAMESPACE);
    let binding = rbac::cluster_role_binding(&cluster, &role_name);
    assert_eq!(binding.metadata.name.as_deref(), Some(role_name.as_str()));
    let subject = &binding.subjects.unwrap()[0];
    assert_eq!(subject.kind, "ServiceAccount");
    assert_eq!(subject.name, rbac::CHE_SA);
    assert_eq!(subject.namespace.as_deref(), Some(TEST_NAMESPACE));
    assert_eq!(binding.role_ref.kind, "ClusterRole");
}

#[test]
fn workspace_cluster_role_covers_workspace_objects() {
    let rules = rbac::workspace_cluster_role_rules();
    let covers = |group: &str, resource: &str| {
        rules.iter().any(|r| {
            r.api_groups
                .as_deref()
                .is_some_and(|g| g.iter().any(|x| x == group))
                && r.resources
                    .as_deref()
                    .is_some_and(|res| res.iter().any(|x| x == resource))
        })
    };
    assert!(covers("", "pods"));
    assert!(covers("", "persistentvolumeclaims"));
    assert!(covers("apps", "deployments"));
    assert!(covers("route.openshift.io", "routes"));
}

#[test]
fn namespace_editor_can_create_projects() {
    let rules = rbac::namespace_editor_rules();
    let project_rule = rules
        .iter()
        .find(|r| {
            r.api_groups
                .as_deref()
                .is_some_and(|g| g.iter().any(|x| x == "project.openshift.io"))
        })
        .expect("project rule present");
    assert!(project_rule
        .verbs
        .iter()
        .any(|v| v == "create"));
}
