//! Embedded PostgreSQL: claim, service, deployment and the generated
//! credentials secret.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe,
    Secret, SecretKeySelector, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{CheCluster, ContainerResources};
use crate::resources::common::{component_labels, selector_labels};
use crate::util::env::image_for;

pub const POSTGRES_NAME: &str = "postgres";
pub const POSTGRES_DATA_PVC: &str = "postgres-data";
/// Secret created when no plain-text password is given in the CR
pub const POSTGRES_SECRET: &str = "che-postgres-secret";
pub const POSTGRES_PORT: i32 = 5432;
pub const POSTGRES_ADMIN_SECRET_KEY_USER: &str = "user";
pub const POSTGRES_ADMIN_SECRET_KEY_PASSWORD: &str = "password";

const DEFAULT_POSTGRES_IMAGE: &str = "quay.io/eclipse/che--centos--postgresql-96-centos7:9.6";
const DATA_MOUNT_PATH: &str = "/var/lib/pgsql/data";

/// Effective database host: CR override or the embedded service name.
pub fn postgres_host(cluster: &CheCluster) -> String {
    cluster
        .spec
        .database
        .che_postgres_host_name
        .clone()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| POSTGRES_NAME.to_string())
}

/// Effective database port as a string, for configmap consumption.
pub fn postgres_port(cluster: &CheCluster) -> String {
    cluster
        .spec
        .database
        .che_postgres_port
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| POSTGRES_PORT.to_string())
}

fn meta(cluster: &CheCluster, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: cluster.namespace(),
        labels: Some(component_labels(cluster, POSTGRES_NAME)),
        ..Default::default()
    }
}

pub fn data_pvc(cluster: &CheCluster) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(cluster, POSTGRES_DATA_PVC),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: cluster.spec.storage.postgres_pvc_storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(cluster.spec.storage.pvc_claim_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(cluster: &CheCluster) -> Service {
    Service {
        metadata: meta(cluster, POSTGRES_NAME),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(cluster, POSTGRES_NAME)),
            ports: Some(vec![ServicePort {
                name: Some(POSTGRES_NAME.to_string()),
                port: POSTGRES_PORT,
                target_port: Some(IntOrString::Int(POSTGRES_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Credentials secret for generated passwords.
pub fn credentials_secret(cluster: &CheCluster, user: &str, password: &str) -> Secret {
    Secret {
        metadata: meta(cluster, POSTGRES_SECRET),
        string_data: Some(BTreeMap::from([
            (POSTGRES_ADMIN_SECRET_KEY_USER.to_string(), user.to_string()),
            (
                POSTGRES_ADMIN_SECRET_KEY_PASSWORD.to_string(),
                password.to_string(),
            ),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

fn resource_requirements(
    overrides: Option<&ContainerResources>,
    default_request_memory: &str,
    default_limit_memory: &str,
) -> k8s_openapi::api::core::v1::ResourceRequirements {
    let mut requests = BTreeMap::from([(
        "memory".to_string(),
        Quantity(default_request_memory.to_string()),
    )]);
    let mut limits = BTreeMap::from([(
        "memory".to_string(),
        Quantity(default_limit_memory.to_string()),
    )]);
    if let Some(res) = overrides {
        if let Some(req) = &res.requests {
            if let Some(cpu) = &req.cpu {
                requests.insert("cpu".to_string(), Quantity(cpu.clone()));
            }
            if let Some(mem) = &req.memory {
                requests.insert("memory".to_string(), Quantity(mem.clone()));
            }
        }
        if let Some(lim) = &res.limits {
            if let Some(cpu) = &lim.cpu {
                limits.insert("cpu".to_string(), Quantity(cpu.clone()));
            }
            if let Some(mem) = &lim.memory {
                limits.insert("memory".to_string(), Quantity(mem.clone()));
            }
        }
    }
    k8s_openapi::api::core::v1::ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

/// Secret-backed env var, used so credential rotation never lands in the
/// pod spec itself.
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

/// Database credentials as container env. `secret_name` is set when the
/// credentials live in a secret (given or generated), otherwise the plain
/// CR fields are inlined.
pub fn credential_env(cluster: &CheCluster, secret_name: Option<&str>) -> Vec<EnvVar> {
    match secret_name {
        Some(secret) => vec![
            secret_env("POSTGRESQL_USER", secret, POSTGRES_ADMIN_SECRET_KEY_USER),
            secret_env(
                "POSTGRESQL_PASSWORD",
                secret,
                POSTGRES_ADMIN_SECRET_KEY_PASSWORD,
            ),
        ],
        None => vec![
            EnvVar {
                name: "POSTGRESQL_USER".to_string(),
                value: cluster.spec.database.che_postgres_user.clone(),
                ..Default::default()
            },
            EnvVar {
                name: "POSTGRESQL_PASSWORD".to_string(),
                value: cluster.spec.database.che_postgres_password.clone(),
                ..Default::default()
            },
        ],
    }
}

pub fn effective_image(cluster: &CheCluster) -> String {
    image_for(
        "postgres",
        cluster.spec.database.postgres_image.as_ref(),
        DEFAULT_POSTGRES_IMAGE,
    )
}

/// Version of the deployed PostgreSQL, taken from the image tag
pub fn version(cluster: &CheCluster) -> Option<String> {
    effective_image(cluster)
        .rsplit_once(':')
        .map(|(_, tag)| tag.to_string())
}

pub fn deployment(cluster: &CheCluster, secret_name: Option<&str>) -> Deployment {
    let image = effective_image(cluster);
    let mut env = credential_env(cluster, secret_name);
    env.push(EnvVar {
        name: "POSTGRESQL_DATABASE".to_string(),
        value: Some(cluster.spec.database.che_postgres_db.clone()),
        ..Default::default()
    });
    env.push(EnvVar {
        name: "POSTGRESQL_ADMIN_PASSWORD".to_string(),
        value_from: secret_name.map(|secret| EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: POSTGRES_ADMIN_SECRET_KEY_PASSWORD.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        value: if secret_name.is_none() {
            cluster.spec.database.che_postgres_password.clone()
        } else {
            None
        },
    });

    let readiness = Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "/bin/sh".to_string(),
                "-i".to_string(),
                "-c".to_string(),
                "psql -h 127.0.0.1 -U $POSTGRESQL_USER -q -d $POSTGRESQL_DATABASE -c 'SELECT 1'"
                    .to_string(),
            ]),
        }),
        initial_delay_seconds: Some(15),
        timeout_seconds: Some(5),
        ..Default::default()
    };

    Deployment {
        metadata: meta(cluster, POSTGRES_NAME),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(cluster, POSTGRES_NAME)),
                ..Default::default()
            },
            // The claim is ReadWriteOnce, two pods must never overlap
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(component_labels(cluster, POSTGRES_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: POSTGRES_NAME.to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        ports: Some(vec![ContainerPort {
                            name: Some(POSTGRES_NAME.to_string()),
                            container_port: POSTGRES_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        env: Some(env),
                        readiness_probe: Some(readiness),
                        resources: Some(resource_requirements(
                            cluster
                                .spec
                                .database
                                .che_postgres_container_resources
                                .as_ref(),
                            "512Mi",
                            "1Gi",
                        )),
                        volume_mounts: Some(vec![VolumeMount {
                            name: POSTGRES_DATA_PVC.to_string(),
                            mount_path: DATA_MOUNT_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: POSTGRES_DATA_PVC.to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: POSTGRES_DATA_PVC.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// True once the deployment's available replica count matches the desired
/// count.
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    available >= desired
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
    fn deployment_uses_recreate_strategy() {
        let d = deployment(&cluster(), Some(POSTGRES_SECRET));
        let strategy = d.spec.unwrap().strategy.unwrap();
        assert_eq!(strategy.type_.as_deref(), Some("Recreate"));
    }

    #[test]
    fn secret_backed_env_references_secret() {
        let env = credential_env(&cluster(), Some(POSTGRES_SECRET));
        let user = env.iter().find(|e| e.name == "POSTGRESQL_USER").unwrap();
        let selector = user
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(selector.name, POSTGRES_SECRET);
        assert_eq!(selector.key, POSTGRES_ADMIN_SECRET_KEY_USER);
    }

    #[test]
    fn plain_env_inlines_cr_fields() {
        let mut c = cluster();
        c.spec.database.che_postgres_user = Some("pgche".to_string());
        c.spec.database.che_postgres_password = Some("s3cret".to_string());
        let env = credential_env(&c, None);
        let pw = env
            .iter()
            .find(|e| e.name == "POSTGRESQL_PASSWORD")
            .unwrap();
        assert_eq!(pw.value.as_deref(), Some("s3cret"));
        assert!(pw.value_from.is_none());
    }

    #[test]
    fn host_and_port_fall_back_to_embedded_service() {
        let c = cluster();
        assert_eq!(postgres_host(&c), "postgres");
        assert_eq!(postgres_port(&c), "5432");
    }

    #[test]
    fn pvc_has_requested_size() {
        let pvc = data_pvc(&cluster());
        let requests = pvc.spec.unwrap().resources.unwrap().requests.unwrap();
        assert_eq!(requests["storage"].0, "1Gi");
    }

    #[test]
    fn version_comes_from_the_image_tag() {
        assert_eq!(version(&cluster()).as_deref(), Some("9.6"));
        let mut c = cluster();
        c.spec.database.postgres_image = Some("registry.example.com/postgres:13.3".to_string());
        assert_eq!(version(&c).as_deref(), Some("13.3"));
        c.spec.database.postgres_image = Some("postgres-no-tag".to_string());
        assert_eq!(version(&c), None);
    }
}
