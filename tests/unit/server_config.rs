//! Unit tests for the generated Che server configuration.

use std::collections::BTreeMap;

use crate::common::{k8s_cluster, test_cluster, test_cluster_with, TEST_NAMESPACE};
use che_operator::crd::CheCluster;
use che_operator::resources::server::{self, ServerInputs};

fn openshift_inputs() -> ServerInputs<'static> {
    ServerInputs {
        che_host: "che-eclipse-che.apps.example.com",
        scheme: "https",
        is_openshift: true,
        identity_provider_url: Some("https://keycloak-eclipse-che.apps.example.com/auth"),
        devfile_registry_url: Some("https://devfile-registry-eclipse-che.apps.example.com"),
        plugin_registry_url: Some("https://plugin-registry-eclipse-che.apps.example.com"),
        db_secret: Some("che-postgres-secret"),
    }
}

fn render(cluster: &CheCluster, inputs: &ServerInputs<'_>) -> BTreeMap<String, String> {
    server::config_map(cluster, inputs).data.unwrap()
}

#[test]
fn api_and_websocket_endpoints_follow_the_scheme() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let cfg = render(&cluster, &openshift_inputs());
    assert_eq!(
        cfg.get("CHE_API").map(String::as_str),
        Some("https://che-eclipse-che.apps.example.com/api")
    );
    assert_eq!(
        cfg.get("CHE_WEBSOCKET_ENDPOINT").map(String::as_str),
        Some("wss://che-eclipse-che.apps.example.com/api/websocket")
    );

    let mut http = openshift_inputs();
    http.scheme = "http";
    let cfg = render(&cluster, &http);
    assert!(cfg.get("CHE_WEBSOCKET_ENDPOINT").unwrap().starts_with("ws://"));
}

#[test]
fn tls_support_reaches_both_infra_keys() {
    let cluster = test_cluster_with(|spec| spec.server.tls_support = true);
    let cfg = render(&cluster, &openshift_inputs());
    assert_eq!(
        cfg.get("CHE_INFRA_OPENSHIFT_TLS__ENABLED").map(String::as_str),
        Some("true")
    );
    assert_eq!(
        cfg.get("CHE_INFRA_KUBERNETES_TLS__ENABLED").map(String::as_str),
        Some("true")
    );
}

#[test]
fn jdbc_url_points_at_the_embedded_database() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let cfg = render(&cluster, &openshift_inputs());
    assert_eq!(
        cfg.get("CHE_JDBC_URL").map(String::as_str),
        Some("jdbc:postgresql://postgres:5432/dbche")
    );
}

#[test]
fn jdbc_url_honors_an_external_database() {
    let cluster = test_cluster_with(|spec| {
        spec.database.external_db = true;
        spec.database.che_postgres_host_name = Some("db.example.com".to_string());
        spec.database.che_postgres_port = Some("5433".to_string());
        spec.database.che_postgres_db = "che_prod".to_string();
    });
    let cfg = render(&cluster, &openshift_inputs());
    assert_eq!(
        cfg.get("CHE_JDBC_URL").map(String::as_str),
        Some("jdbc:postgresql://db.example.com:5433/che_prod")
    );
}

#[test]
fn plugin_registry_url_gets_the_v3_suffix() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let cfg = render(&cluster, &openshift_inputs());
    assert_eq!(
        cfg.get("CHE_WORKSPACE_PLUGIN__REGISTRY__URL").map(String::as_str),
        Some("https://plugin-registry-eclipse-che.apps.example.com/v3")
    );
    assert_eq!(
        cfg.get("CHE_WORKSPACE_DEVFILE__REGISTRY__URL").map(String::as_str),
        Some("https://devfile-registry-eclipse-che.apps.example.com")
    );
}

#[test]
fn ingress_domain_only_appears_on_kubernetes() {
    let cluster = k8s_cluster("192.168.99.1.nip.io");
    let mut inputs = openshift_inputs();
    inputs.is_openshift = false;
    let cfg = render(&cluster, &inputs);
    assert_eq!(
        cfg.get("CHE_INFRA_KUBERNETES_INGRESS_DOMAIN").map(String::as_str),
        Some("192.168.99.1.nip.io")
    );

    let cfg = render(&cluster, &openshift_inputs());
    assert!(cfg.get("CHE_INFRA_KUBERNETES_INGRESS_DOMAIN").is_none());
}

#[test]
fn workspace_namespace_defaults_to_the_cr_namespace() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let cfg = render(&cluster, &openshift_inputs());
    assert_eq!(
        cfg.get("CHE_INFRA_KUBERNETES_NAMESPACE_DEFAULT").map(String::as_str),
        Some(TEST_NAMESPACE)
    );
}
