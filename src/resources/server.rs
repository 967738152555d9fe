//! The Che server itself: configmap, service and deployment.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, EnvVar, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{CheCluster, ChePhase};
use crate::resources::common::{component_labels, selector_labels};
use crate::resources::postgres::{
    postgres_host, postgres_port, POSTGRES_ADMIN_SECRET_KEY_PASSWORD,
    POSTGRES_ADMIN_SECRET_KEY_USER,
};
use crate::resources::rbac::CHE_SA;
use crate::util::env::image_for;

/// Service in front of the server; the name is load-bearing, ingresses and
/// routes point at it
pub const CHE_HOST_SERVICE: &str = "che-host";
/// ConfigMap holding the server's whole environment
pub const CHE_CONFIG_MAP: &str = "che";
pub const CHE_PORT: i32 = 8080;
pub const CHE_METRICS_PORT: i32 = 8087;

const DEFAULT_CHE_IMAGE: &str = "quay.io/eclipse/che-server";
const DEFAULT_CHE_TAG: &str = "7.30.1";

/// Derived values the server phase resolves before building objects.
pub struct ServerInputs<'a> {
    pub che_host: &'a str,
    pub scheme: &'a str,
    pub is_openshift: bool,
    pub identity_provider_url: Option<&'a str>,
    pub devfile_registry_url: Option<&'a str>,
    pub plugin_registry_url: Option<&'a str>,
    /// Secret holding the database credentials, if any
    pub db_secret: Option<&'a str>,
}

fn meta(cluster: &CheCluster, name: &str) -> ObjectMeta {
    let flavor = cluster.spec.server.che_flavor.clone();
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: cluster.namespace(),
        labels: Some(component_labels(cluster, &flavor)),
        ..Default::default()
    }
}

pub fn effective_image(cluster: &CheCluster) -> String {
    let repo = image_for(
        "che_server",
        cluster.spec.server.che_image.as_ref(),
        DEFAULT_CHE_IMAGE,
    );
    // A RELATED_IMAGE or CR override may already pin a tag
    if repo.contains(':') {
        return repo;
    }
    let tag = cluster
        .spec
        .server
        .che_image_tag
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_CHE_TAG.to_string());
    format!("{repo}:{tag}")
}

pub fn config_map(cluster: &CheCluster, inputs: &ServerInputs<'_>) -> k8s_openapi::api::core::v1::ConfigMap {
    let che_api = format!("{}://{}/api", inputs.scheme, inputs.che_host);
    let websocket_scheme = if inputs.scheme == "https" { "wss" } else { "ws" };
    let tls = cluster.spec.server.tls_support.to_string();

    let mut data = BTreeMap::from([
        ("CHE_HOST".to_string(), inputs.che_host.to_string()),
        ("CHE_PORT".to_string(), CHE_PORT.to_string()),
        ("CHE_API".to_string(), che_api),
        (
            "CHE_WEBSOCKET_ENDPOINT".to_string(),
            format!("{websocket_scheme}://{}/api/websocket", inputs.che_host),
        ),
        ("CHE_INFRA_OPENSHIFT_TLS__ENABLED".to_string(), tls.clone()),
        ("CHE_INFRA_KUBERNETES_TLS__ENABLED".to_string(), tls),
        (
            "CHE_INFRA_KUBERNETES_NAMESPACE_DEFAULT".to_string(),
            cluster.workspace_namespace(),
        ),
        (
            "CHE_JDBC_URL".to_string(),
            format!(
                "jdbc:postgresql://{}:{}/{}",
                postgres_host(cluster),
                postgres_port(cluster),
                cluster.spec.database.che_postgres_db
            ),
        ),
        (
            "CHE_INFRA_KUBERNETES_PVC_STRATEGY".to_string(),
            cluster.spec.storage.pvc_strategy.clone(),
        ),
        (
            "CHE_INFRA_KUBERNETES_PVC_QUANTITY".to_string(),
            cluster.spec.storage.pvc_claim_size.clone(),
        ),
        (
            "CHE_INFRA_KUBERNETES_SERVER__STRATEGY".to_string(),
            cluster.spec.server.server_exposure_strategy.clone(),
        ),
    ]);

    if !inputs.is_openshift {
        if let Some(domain) = cluster
            .spec
            .k8s
            .ingress_domain
            .as_deref()
            .filter(|d| !d.is_empty())
        {
            data.insert(
                "CHE_INFRA_KUBERNETES_INGRESS_DOMAIN".to_string(),
                domain.to_string(),
            );
        }
    }
    if let Some(idp) = inputs.identity_provider_url {
        data.insert("CHE_KEYCLOAK_AUTH__SERVER__URL".to_string(), idp.to_string());
        data.insert(
            "CHE_KEYCLOAK_REALM".to_string(),
            cluster
                .spec
                .auth
                .identity_provider_realm
                .clone()
                .unwrap_or_else(|| cluster.spec.server.che_flavor.clone()),
        );
        data.insert(
            "CHE_KEYCLOAK_CLIENT__ID".to_string(),
            cluster
                .spec
                .auth
                .identity_provider_client_id
                .clone()
                .unwrap_or_else(|| format!("{}-public", cluster.spec.server.che_flavor)),
        );
    }
    if let Some(url) = inputs.devfile_registry_url {
        data.insert(
            "CHE_WORKSPACE_DEVFILE__REGISTRY__URL".to_string(),
            url.to_string(),
        );
    }
    if let Some(url) = inputs.plugin_registry_url {
        data.insert(
            "CHE_WORKSPACE_PLUGIN__REGISTRY__URL".to_string(),
            format!("{url}/v3"),
        );
    }
    if let Some(proxy) = cluster
        .spec
        .server
        .proxy_url
        .as_deref()
        .filter(|u| !u.is_empty())
    {
        data.insert("CHE_WORKSPACE_HTTP__PROXY".to_string(), proxy.to_string());
        data.insert("CHE_WORKSPACE_HTTPS__PROXY".to_string(), proxy.to_string());
        if let Some(no_proxy) = cluster.spec.server.non_proxy_hosts.as_deref() {
            data.insert("CHE_WORKSPACE_NO__PROXY".to_string(), no_proxy.to_string());
        }
    }

    k8s_openapi::api::core::v1::ConfigMap {
        metadata: meta(cluster, CHE_CONFIG_MAP),
        data: Some(data),
        ..Default::default()
    }
}

pub fn service(cluster: &CheCluster) -> Service {
    let flavor = cluster.spec.server.che_flavor.clone();
    Service {
        metadata: meta(cluster, CHE_HOST_SERVICE),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(cluster, &flavor)),
            ports: Some(vec![
                ServicePort {
                    name: Some("http".to_string()),
                    port: CHE_PORT,
                    target_port: Some(IntOrString::Int(CHE_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("metrics".to_string()),
                    port: CHE_METRICS_PORT,
                    target_port: Some(IntOrString::Int(CHE_METRICS_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn deployment(
    cluster: &CheCluster,
    inputs: &ServerInputs<'_>,
    cm_revision: &str,
) -> Deployment {
    let flavor = cluster.spec.server.che_flavor.clone();

    let mut env = vec![EnvVar {
        name: "CM_REVISION".to_string(),
        value: Some(cm_revision.to_string()),
        ..Default::default()
    }];
    if let Some(secret) = inputs.db_secret {
        for (var, key) in [
            ("CHE_JDBC_USERNAME", POSTGRES_ADMIN_SECRET_KEY_USER),
            ("CHE_JDBC_PASSWORD", POSTGRES_ADMIN_SECRET_KEY_PASSWORD),
        ] {
            env.push(EnvVar {
                name: var.to_string(),
                value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                    secret_key_ref: Some(k8s_openapi::api::core::v1::SecretKeySelector {
                        name: secret.to_string(),
                        key: key.to_string(),
                        optional: Some(false),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
    } else {
        env.push(EnvVar {
            name: "CHE_JDBC_USERNAME".to_string(),
            value: cluster.spec.database.che_postgres_user.clone(),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "CHE_JDBC_PASSWORD".to_string(),
            value: cluster.spec.database.che_postgres_password.clone(),
            ..Default::default()
        });
    }

    let probe = |delay: i32, failures: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/api/system/state".to_string()),
            port: IntOrString::Int(CHE_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(delay),
        timeout_seconds: Some(10),
        failure_threshold: Some(failures),
        ..Default::default()
    };

    let mut resources = BTreeMap::new();
    let request = cluster
        .spec
        .server
        .server_memory_request
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "512Mi".to_string());
    let limit = cluster
        .spec
        .server
        .server_memory_limit
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "1Gi".to_string());
    resources.insert("requests", request);
    resources.insert("limits", limit);

    Deployment {
        metadata: meta(cluster, &flavor),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(cluster, &flavor)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(component_labels(cluster, &flavor)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(CHE_SA.to_string()),
                    containers: vec![Container {
                        name: flavor.clone(),
                        image: Some(effective_image(cluster)),
                        image_pull_policy: Some("Always".to_string()),
                        ports: Some(vec![
                            ContainerPort {
                                name: Some("http".to_string()),
                                container_port: CHE_PORT,
                                protocol: Some("TCP".to_string()),
                                ..Default::default()
                            },
                            ContainerPort {
                                name: Some("metrics".to_string()),
                                container_port: CHE_METRICS_PORT,
                                protocol: Some("TCP".to_string()),
                                ..Default::default()
                            },
                        ]),
                        env: Some(env),
                        env_from: Some(vec![EnvFromSource {
                            config_map_ref: Some(ConfigMapEnvSource {
                                name: CHE_CONFIG_MAP.to_string(),
                                optional: Some(false),
                            }),
                            ..Default::default()
                        }]),
                        readiness_probe: Some(probe(25, 5)),
                        liveness_probe: Some(probe(50, 3)),
                        resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                            requests: Some(BTreeMap::from([(
                                "memory".to_string(),
                                Quantity(resources["requests"].clone()),
                            )])),
                            limits: Some(BTreeMap::from([(
                                "memory".to_string(),
                                Quantity(resources["limits"].clone()),
                            )])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Lifecycle phase derived from the deployment rollout.
pub fn rollout_phase(deployment: &Deployment) -> ChePhase {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let status = match &deployment.status {
        Some(s) => s,
        None => return ChePhase::Unavailable,
    };
    let updated = status.updated_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    if updated < desired || status.replicas.unwrap_or(0) > desired {
        ChePhase::RollingUpdateInProgress
    } else if available >= desired {
        ChePhase::Available
    } else {
        ChePhase::Unavailable
    }
}
