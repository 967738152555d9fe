//! Unit tests for exposure backend selection and the objects it produces.

use crate::common::{k8s_cluster, test_cluster, test_cluster_with, TEST_NAMESPACE};
use che_operator::resources::exposure::{self, ExposureBackend, MULTI_HOST, SINGLE_HOST};

#[test]
fn backend_selection_grid() {
    assert_eq!(
        ExposureBackend::select(true, MULTI_HOST),
        ExposureBackend::Route
    );
    assert_eq!(
        ExposureBackend::select(false, MULTI_HOST),
        ExposureBackend::Ingress
    );
    // Single-host wins over the platform
    assert_eq!(
        ExposureBackend::select(true, SINGLE_HOST),
        ExposureBackend::GatewayConfig
    );
    assert_eq!(
        ExposureBackend::select(false, SINGLE_HOST),
        ExposureBackend::GatewayConfig
    );
}

#[test]
fn multi_host_hostnames_are_per_component() {
    let cluster = k8s_cluster("192.168.99.1.nip.io");
    assert_eq!(
        exposure::multi_host_hostname(&cluster, "keycloak"),
        "keycloak-eclipse-che.192.168.99.1.nip.io"
    );
    assert_eq!(
        exposure::multi_host_hostname(&cluster, "devfile-registry"),
        "devfile-registry-eclipse-che.192.168.99.1.nip.io"
    );
}

#[test]
fn single_host_urls_are_path_prefixed() {
    let url = exposure::public_url(
        ExposureBackend::GatewayConfig,
        "https",
        "che.example.com",
        "",
        "plugin-registry",
    );
    assert_eq!(url, "https://che.example.com/plugin-registry");

    let url = exposure::public_url(
        ExposureBackend::Route,
        "https",
        "che.example.com",
        "plugin-registry-eclipse-che.example.com",
        "plugin-registry",
    );
    assert_eq!(url, "https://plugin-registry-eclipse-che.example.com");
}

#[test]
fn tls_route_terminates_edge_and_redirects() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let route = exposure::route(&cluster, "keycloak", "keycloak.example.com", "keycloak", 8080, true);
    let tls = route.spec.tls.unwrap();
    assert_eq!(tls.termination, "edge");
    assert_eq!(tls.insecure_edge_termination_policy.as_deref(), Some("Redirect"));

    let plain = exposure::route(&cluster, "keycloak", "keycloak.example.com", "keycloak", 8080, false);
    assert!(plain.spec.tls.is_none());
}

#[test]
fn ingress_tls_falls_back_to_the_generated_secret() {
    let cluster = k8s_cluster("example.com");
    let ingress = exposure::ingress(&cluster, "che", "che.example.com", "che-host", 8080, true);
    let tls = ingress.spec.unwrap().tls.unwrap();
    assert_eq!(tls[0].secret_name.as_deref(), Some("che-tls"));

    let cluster = test_cluster_with(|spec| {
        spec.k8s.ingress_domain = Some("example.com".to_string());
        spec.k8s.tls_secret_name = Some("user-tls".to_string());
    });
    let ingress = exposure::ingress(&cluster, "che", "che.example.com", "che-host", 8080, true);
    let tls = ingress.spec.unwrap().tls.unwrap();
    assert_eq!(tls[0].secret_name.as_deref(), Some("user-tls"));
}

#[test]
fn gateway_config_strips_the_path_prefix() {
    let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
    let cm = exposure::gateway_config_map(&cluster, "devfile-registry", "devfile-registry", 8080);
    assert_eq!(
        cm.metadata.name.as_deref(),
        Some("devfile-registry-gateway-config")
    );
    let data = cm.data.unwrap();
    let rule = data.values().next().unwrap();
    assert!(rule.contains("PathPrefix(`/devfile-registry`)"));
    assert!(rule.contains("stripprefix.prefixes: /devfile-registry"));
    assert!(rule.contains("http://devfile-registry.eclipse-che.svc:8080"));
}
