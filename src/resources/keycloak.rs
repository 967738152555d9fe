//! Embedded Keycloak identity provider.
//!
//! The deployment's start command assembles a Java truststore out of every
//! certificate the server may have to talk through (router, API server,
//! service account CA, custom CA bundle) before handing off to the stock
//! entrypoint. Referenced secret and configmap resourceVersions are pinned
//! as pod-template annotations so credential edits roll the pods.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, Secret, SecretKeySelector, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::CheCluster;
use crate::resources::common::{component_labels, selector_labels, PART_OF};
use crate::resources::postgres::{postgres_host, postgres_port};
use crate::util::env::image_for;

pub const KEYCLOAK_NAME: &str = "keycloak";
pub const KEYCLOAK_PORT: i32 = 8080;
/// Admin credentials of the embedded identity provider
pub const IDENTITY_SECRET: &str = "che-identity-secret";
/// Password of the identity provider's own database role
pub const IDENTITY_POSTGRES_SECRET: &str = "che-identity-postgres-secret";
/// Database provisioned for the identity provider inside embedded PostgreSQL
pub const KEYCLOAK_DB: &str = "keycloak";
pub const KEYCLOAK_DB_USER: &str = "keycloak";

/// Label selector for OAuth SCM configuration secrets
pub const OAUTH_SCM_COMPONENT: &str = "oauth-scm-configuration";
/// Annotation naming the SCM provider a configuration secret is for
pub const OAUTH_SCM_SERVER_ANNOTATION: &str = "che.eclipse.org/oauth-scm-server";

const DEFAULT_KEYCLOAK_IMAGE: &str = "quay.io/eclipse/che-keycloak:7.30.1";
const TRUST_STORE_MOUNT: &str = "/public-certs";
const JKS_PATH: &str = "/scripts/openshift.jks";
const JKS_PASSWORD: &str = "openshift";

/// Label selector string matching GitHub OAuth configuration secrets.
pub fn github_oauth_selector() -> String {
    format!(
        "app.kubernetes.io/part-of={PART_OF},app.kubernetes.io/component={OAUTH_SCM_COMPONENT}"
    )
}

/// Whether a discovered SCM secret is annotated for GitHub.
pub fn is_github_oauth_secret(secret: &Secret) -> bool {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(OAUTH_SCM_SERVER_ANNOTATION))
        .is_some_and(|v| v == "github")
}

fn meta(cluster: &CheCluster, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: cluster.namespace(),
        labels: Some(component_labels(cluster, KEYCLOAK_NAME)),
        ..Default::default()
    }
}

pub fn service(cluster: &CheCluster) -> Service {
    Service {
        metadata: meta(cluster, KEYCLOAK_NAME),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(cluster, KEYCLOAK_NAME)),
            ports: Some(vec![ServicePort {
                name: Some(KEYCLOAK_NAME.to_string()),
                port: KEYCLOAK_PORT,
                target_port: Some(IntOrString::Int(KEYCLOAK_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn identity_secret(cluster: &CheCluster, user: &str, password: &str) -> Secret {
    Secret {
        metadata: meta(cluster, IDENTITY_SECRET),
        string_data: Some(BTreeMap::from([
            ("user".to_string(), user.to_string()),
            ("password".to_string(), password.to_string()),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn identity_postgres_secret(cluster: &CheCluster, password: &str) -> Secret {
    Secret {
        metadata: meta(cluster, IDENTITY_POSTGRES_SECRET),
        string_data: Some(BTreeMap::from([(
            "password".to_string(),
            password.to_string(),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Annotation key carrying the resourceVersion of a referenced object.
pub fn revision_annotation(name: &str) -> String {
    format!("che.eclipse.org/{name}.resource-version")
}

fn keytool_import(alias: &str, file: &str) -> String {
    format!(
        "keytool -importcert -alias {alias} -keystore {JKS_PATH} \
         -file {file} -storepass {JKS_PASSWORD} -noprompt"
    )
}

/// Shell command run by the Keycloak container. Builds the truststore, then
/// execs the stock entrypoint.
pub fn start_command(cluster: &CheCluster, che_host: &str, proxy_cli: Option<&str>) -> String {
    let mut steps: Vec<String> = Vec::new();

    // Router serving certificate, fetched live so self-signed routers work
    steps.push(format!(
        "openssl s_client -showcerts -connect {che_host}:443 </dev/null 2>/dev/null \
         | sed -ne '/-BEGIN CERTIFICATE-/,/-END CERTIFICATE-/p' > /tmp/router.crt"
    ));
    steps.push(format!(
        "[ -s /tmp/router.crt ] && {} || true",
        keytool_import("ROUTER", "/tmp/router.crt")
    ));

    // API server CA from the mounted service account
    steps.push(format!(
        "[ -f /var/run/secrets/kubernetes.io/serviceaccount/ca.crt ] && {} || true",
        keytool_import(
            "OPENSHIFTAPI",
            "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt"
        )
    ));

    // Administrator-supplied CA bundle
    if cluster
        .spec
        .server
        .server_trust_store_config_map_name
        .is_some()
    {
        steps.push(format!(
            "i=0; for cert in {TRUST_STORE_MOUNT}/*; do \
             keytool -importcert -alias CUSTOM$i -keystore {JKS_PATH} \
             -file $cert -storepass {JKS_PASSWORD} -noprompt; i=$((i+1)); done"
        ));
    }

    if let Some(cli) = proxy_cli {
        steps.push(cli.to_string());
    }

    steps.push(format!(
        "/opt/jboss/docker-entrypoint.sh -b 0.0.0.0 -c standalone.xml \
         -Djavax.net.ssl.trustStore={JKS_PATH} \
         -Djavax.net.ssl.trustStorePassword={JKS_PASSWORD}"
    ));

    steps.join(" && ")
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Inputs resolved by the identity provider phase before building the
/// deployment.
pub struct KeycloakDeployment<'a> {
    pub che_host: &'a str,
    pub proxy_cli: Option<&'a str>,
    /// Name of the discovered GitHub OAuth secret, if any
    pub github_secret: Option<&'a str>,
    /// resourceVersions of every referenced secret/configmap, keyed by name
    pub referenced_versions: &'a BTreeMap<String, String>,
}

pub fn deployment(cluster: &CheCluster, inputs: &KeycloakDeployment<'_>) -> Deployment {
    let image = image_for(
        "keycloak",
        cluster.spec.auth.identity_provider_image.as_ref(),
        DEFAULT_KEYCLOAK_IMAGE,
    );

    let mut env = vec![
        EnvVar {
            name: "PROXY_ADDRESS_FORWARDING".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "DB_VENDOR".to_string(),
            value: Some("POSTGRES".to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "DB_ADDR".to_string(),
            value: Some(postgres_host(cluster)),
            ..Default::default()
        },
        EnvVar {
            name: "DB_PORT".to_string(),
            value: Some(postgres_port(cluster)),
            ..Default::default()
        },
        EnvVar {
            name: "DB_DATABASE".to_string(),
            value: Some(KEYCLOAK_DB.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "DB_USER".to_string(),
            value: Some(KEYCLOAK_DB_USER.to_string()),
            ..Default::default()
        },
        secret_env("DB_PASSWORD", IDENTITY_POSTGRES_SECRET, "password"),
        secret_env("KEYCLOAK_USER", IDENTITY_SECRET, "user"),
        secret_env("KEYCLOAK_PASSWORD", IDENTITY_SECRET, "password"),
    ];
    if let Some(github) = inputs.github_secret {
        env.push(secret_env("GITHUB_CLIENT_ID", github, "id"));
        env.push(secret_env("GITHUB_SECRET", github, "secret"));
    }

    let mut annotations = BTreeMap::new();
    for (name, version) in inputs.referenced_versions {
        annotations.insert(revision_annotation(name), version.clone());
    }

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    if let Some(cm) = &cluster.spec.server.server_trust_store_config_map_name {
        volumes.push(Volume {
            name: "trust-store".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: "trust-store".to_string(),
            mount_path: TRUST_STORE_MOUNT.to_string(),
            ..Default::default()
        });
    }

    let probe = |delay: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/auth/js/keycloak.js".to_string()),
            port: IntOrString::Int(KEYCLOAK_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(delay),
        timeout_seconds: Some(5),
        ..Default::default()
    };

    Deployment {
        metadata: meta(cluster, KEYCLOAK_NAME),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(cluster, KEYCLOAK_NAME)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(component_labels(cluster, KEYCLOAK_NAME)),
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: KEYCLOAK_NAME.to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec!["/bin/sh".to_string()]),
                        args: Some(vec![
                            "-c".to_string(),
                            start_command(cluster, inputs.che_host, inputs.proxy_cli),
                        ]),
                        ports: Some(vec![ContainerPort {
                            name: Some(KEYCLOAK_NAME.to_string()),
                            container_port: KEYCLOAK_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        env: Some(env),
                        readiness_probe: Some(probe(25)),
                        liveness_probe: Some(probe(30)),
                        volume_mounts: if mounts.is_empty() {
                            None
                        } else {
                            Some(mounts)
                        },
                        ..Default::default()
                    }],
                    volumes: if volumes.is_empty() {
                        None
                    } else {
                        Some(volumes)
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::CheClusterSpec;

    fn cluster() -> CheCluster {
        let mut c = CheCluster::new("eclipse-che", CheClusterSpec::default());
        c.metadata.namespace = Some("eclipse-che".to_string());
        c
    }

    #[test]
    fn start_command_imports_router_cert_before_entrypoint() {
        let cmd = start_command(&cluster(), "che-eclipse-che.example.com", None);
        let router = cmd.find("openssl s_client").unwrap();
        let entrypoint = cmd.find("docker-entrypoint.sh").unwrap();
        assert!(router < entrypoint);
        assert!(cmd.contains("che-eclipse-che.example.com:443"));
    }

    #[test]
    fn custom_ca_bundle_adds_import_loop() {
        let mut c = cluster();
        c.spec.server.server_trust_store_config_map_name = Some("ca-bundle".to_string());
        let cmd = start_command(&c, "che.example.com", None);
        assert!(cmd.contains("/public-certs"));
    }

    #[test]
    fn referenced_versions_become_pod_annotations() {
        let versions = BTreeMap::from([
            (IDENTITY_SECRET.to_string(), "41".to_string()),
            (IDENTITY_POSTGRES_SECRET.to_string(), "7".to_string()),
        ]);
        let d = deployment(
            &cluster(),
            &KeycloakDeployment {
                che_host: "che.example.com",
                proxy_cli: None,
                github_secret: None,
                referenced_versions: &versions,
            },
        );
        let annotations = d
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap();
        assert_eq!(
            annotations
                .get(&revision_annotation(IDENTITY_SECRET))
                .map(String::as_str),
            Some("41")
        );
    }

    #[test]
    fn github_secret_detection_needs_annotation() {
        let mut secret = Secret::default();
        assert!(!is_github_oauth_secret(&secret));
        secret.metadata.annotations = Some(BTreeMap::from([(
            OAUTH_SCM_SERVER_ANNOTATION.to_string(),
            "github".to_string(),
        )]));
        assert!(is_github_oauth_secret(&secret));
    }

    #[test]
    fn github_env_only_with_discovered_secret() {
        let versions = BTreeMap::new();
        let with = deployment(
            &cluster(),
            &KeycloakDeployment {
                che_host: "che.example.com",
                proxy_cli: None,
                github_secret: Some("github-oauth-config"),
                referenced_versions: &versions,
            },
        );
        let env = with.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        assert!(env.iter().any(|e| e.name == "GITHUB_CLIENT_ID"));
    }
}
