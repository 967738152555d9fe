//! Endpoint exposure: Routes on OpenShift, Ingresses on Kubernetes, or a
//! gateway route ConfigMap under the single-host strategy. Each component
//! picks exactly one backend; the phase deletes the other two.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::openshift::{Route, RoutePort, RouteSpec, RouteTargetReference, TLSConfig};
use crate::crd::CheCluster;
use crate::resources::common::component_labels;
use crate::resources::tls::CHE_TLS_SECRET;

pub const MULTI_HOST: &str = "multi-host";
pub const SINGLE_HOST: &str = "single-host";

/// Which object kind exposes a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureBackend {
    /// OpenShift Route, one host per component
    Route,
    /// Kubernetes Ingress, one host per component
    Ingress,
    /// Route entry in the single-host gateway's ConfigMap
    GatewayConfig,
}

impl ExposureBackend {
    pub fn select(is_openshift: bool, strategy: &str) -> Self {
        if strategy == SINGLE_HOST {
            ExposureBackend::GatewayConfig
        } else if is_openshift {
            ExposureBackend::Route
        } else {
            ExposureBackend::Ingress
        }
    }
}

/// Host a component is served on under the multi-host strategy.
pub fn multi_host_hostname(cluster: &CheCluster, component: &str) -> String {
    let ns = cluster.namespace().unwrap_or_default();
    let domain = cluster.spec.k8s.ingress_domain.as_deref().unwrap_or_default();
    format!("{component}-{ns}.{domain}")
}

/// Public URL of a component for the given backend.
pub fn public_url(
    backend: ExposureBackend,
    scheme: &str,
    che_host: &str,
    component_host: &str,
    component: &str,
) -> String {
    match backend {
        // Single-host components live under a path prefix on the che host
        ExposureBackend::GatewayConfig => format!("{scheme}://{che_host}/{component}"),
        _ => format!("{scheme}://{component_host}"),
    }
}

fn meta(cluster: &CheCluster, name: &str, component: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: cluster.namespace(),
        labels: Some(component_labels(cluster, component)),
        ..Default::default()
    }
}

pub fn route(
    cluster: &CheCluster,
    component: &str,
    host: &str,
    service: &str,
    port: i32,
    tls: bool,
) -> Route {
    Route {
        metadata: meta(cluster, component, component),
        spec: RouteSpec {
            host: Some(host.to_string()),
            path: None,
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: service.to_string(),
                weight: Some(100),
            },
            port: Some(RoutePort {
                target_port: IntOrString::Int(port),
            }),
            tls: tls.then(|| TLSConfig {
                termination: "edge".to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
        },
        status: None,
    }
}

pub fn ingress(
    cluster: &CheCluster,
    component: &str,
    host: &str,
    service: &str,
    port: i32,
    tls: bool,
) -> Ingress {
    let ingress_class = cluster
        .spec
        .k8s
        .ingress_class
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "nginx".to_string());
    let tls_secret = cluster
        .spec
        .k8s
        .tls_secret_name
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| CHE_TLS_SECRET.to_string());

    let mut metadata = meta(cluster, component, component);
    metadata.annotations = Some(BTreeMap::from([(
        "nginx.ingress.kubernetes.io/ssl-redirect".to_string(),
        tls.to_string(),
    )]));

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(ingress_class),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: tls.then(|| {
                vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(tls_secret),
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Name of a component's gateway route ConfigMap.
pub fn gateway_config_name(component: &str) -> String {
    format!("{component}-gateway-config")
}

/// Route entry consumed by the single-host gateway. Strips the path prefix
/// before forwarding to the backing service.
pub fn gateway_config_map(
    cluster: &CheCluster,
    component: &str,
    service: &str,
    port: i32,
) -> ConfigMap {
    let ns = cluster.namespace().unwrap_or_default();
    let rule = format!(
        "traefik.http.routers.{component}.rule: PathPrefix(`/{component}`)\n\
         traefik.http.routers.{component}.service: {component}\n\
         traefik.http.routers.{component}.middlewares: {component}\n\
         traefik.http.middlewares.{component}.stripprefix.prefixes: /{component}\n\
         traefik.http.services.{component}.loadbalancer.server.url: http://{service}.{ns}.svc:{port}\n"
    );
    let mut metadata = meta(cluster, &gateway_config_name(component), component);
    if let Some(labels) = metadata.labels.as_mut() {
        labels.insert(
            "app.kubernetes.io/component".to_string(),
            "che-gateway-config".to_string(),
        );
    }
    ConfigMap {
        metadata,
        data: Some(BTreeMap::from([(
            format!("{component}.yml"),
            rule,
        )])),
        ..Default::default()
    }
}
