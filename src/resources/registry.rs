//! Devfile and plugin registries, one parameterized implementation.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, EnvVar, HTTPGetAction,
    PodSpec, PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::CheCluster;
use crate::resources::common::{component_labels, selector_labels};
use crate::util::env::image_for;

pub const REGISTRY_PORT: i32 = 8080;

const DEFAULT_DEVFILE_REGISTRY_IMAGE: &str = "quay.io/eclipse/che-devfile-registry:7.30.1";
const DEFAULT_PLUGIN_REGISTRY_IMAGE: &str = "quay.io/eclipse/che-plugin-registry:7.30.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Devfile,
    Plugin,
}

impl RegistryKind {
    /// Object name shared by the service, deployment and configmap
    pub fn name(&self) -> &'static str {
        match self {
            RegistryKind::Devfile => "devfile-registry",
            RegistryKind::Plugin => "plugin-registry",
        }
    }

    fn default_image(&self) -> &'static str {
        match self {
            RegistryKind::Devfile => DEFAULT_DEVFILE_REGISTRY_IMAGE,
            RegistryKind::Plugin => DEFAULT_PLUGIN_REGISTRY_IMAGE,
        }
    }

    fn related_image_key(&self) -> &'static str {
        match self {
            RegistryKind::Devfile => "devfile_registry",
            RegistryKind::Plugin => "plugin_registry",
        }
    }

    fn probe_path(&self) -> &'static str {
        match self {
            RegistryKind::Devfile => "/devfiles/",
            RegistryKind::Plugin => "/v3/plugins/",
        }
    }

    /// The registry is externally managed and must not be deployed
    pub fn external(&self, cluster: &CheCluster) -> bool {
        match self {
            RegistryKind::Devfile => cluster.spec.server.external_devfile_registry,
            RegistryKind::Plugin => cluster.spec.server.external_plugin_registry,
        }
    }

    /// Administrator-supplied public URL, used verbatim in external mode
    pub fn url_override<'a>(&self, cluster: &'a CheCluster) -> Option<&'a str> {
        let url = match self {
            RegistryKind::Devfile => cluster.spec.server.devfile_registry_url.as_deref(),
            RegistryKind::Plugin => cluster.spec.server.plugin_registry_url.as_deref(),
        };
        url.filter(|u| !u.is_empty())
    }

    fn image(&self, cluster: &CheCluster) -> String {
        let cr_override = match self {
            RegistryKind::Devfile => cluster.spec.server.devfile_registry_image.as_ref(),
            RegistryKind::Plugin => cluster.spec.server.plugin_registry_image.as_ref(),
        };
        image_for(self.related_image_key(), cr_override, self.default_image())
    }
}

fn meta(cluster: &CheCluster, kind: RegistryKind) -> ObjectMeta {
    ObjectMeta {
        name: Some(kind.name().to_string()),
        namespace: cluster.namespace(),
        labels: Some(component_labels(cluster, kind.name())),
        ..Default::default()
    }
}

pub fn service(cluster: &CheCluster, kind: RegistryKind) -> Service {
    Service {
        metadata: meta(cluster, kind),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(cluster, kind.name())),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: REGISTRY_PORT,
                target_port: Some(IntOrString::Int(REGISTRY_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Air-gap configuration consumed by the registry via envFrom. Only built
/// when a mirror registry is configured.
pub fn airgap_config_map(cluster: &CheCluster, kind: RegistryKind) -> Option<ConfigMap> {
    let hostname = cluster
        .spec
        .server
        .air_gap_container_registry_hostname
        .as_deref()
        .filter(|h| !h.is_empty())?;
    let mut data = BTreeMap::from([(
        "CHE_SIDECAR_CONTAINERS_REGISTRY_URL".to_string(),
        hostname.to_string(),
    )]);
    if let Some(org) = cluster
        .spec
        .server
        .air_gap_container_registry_organization
        .as_deref()
        .filter(|o| !o.is_empty())
    {
        data.insert(
            "CHE_SIDECAR_CONTAINERS_REGISTRY_ORGANIZATION".to_string(),
            org.to_string(),
        );
    }
    Some(ConfigMap {
        metadata: meta(cluster, kind),
        data: Some(data),
        ..Default::default()
    })
}

/// `cm_revision` is the resourceVersion of the air-gap configmap; pinning it
/// as container env rolls the pods whenever the configmap changes.
pub fn deployment(
    cluster: &CheCluster,
    kind: RegistryKind,
    cm_revision: Option<&str>,
) -> Deployment {
    let probe = |delay: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some(kind.probe_path().to_string()),
            port: IntOrString::Int(REGISTRY_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(delay),
        timeout_seconds: Some(3),
        success_threshold: Some(1),
        failure_threshold: Some(10),
        ..Default::default()
    };

    let env = vec![EnvVar {
        name: "CM_REVISION".to_string(),
        value: Some(cm_revision.unwrap_or_default().to_string()),
        ..Default::default()
    }];
    let env_from = cm_revision.map(|_| {
        vec![EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: kind.name().to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }]
    });

    Deployment {
        metadata: meta(cluster, kind),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            revision_history_limit: Some(2),
            selector: LabelSelector {
                match_labels: Some(selector_labels(cluster, kind.name())),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::String("25%".to_string())),
                    max_unavailable: Some(IntOrString::String("25%".to_string())),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(component_labels(cluster, kind.name())),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: kind.name().to_string(),
                        image: Some(kind.image(cluster)),
                        image_pull_policy: Some("Always".to_string()),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: REGISTRY_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        env: Some(env),
                        env_from,
                        readiness_probe: Some(probe(3)),
                        liveness_probe: Some(probe(30)),
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
    fn deployment_pins_configmap_revision() {
        let d = deployment(&cluster(), RegistryKind::Devfile, Some("1234"));
        let container = &d.spec.unwrap().template.spec.unwrap().containers[0];
        let cm_rev = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.name == "CM_REVISION")
            .unwrap();
        assert_eq!(cm_rev.value.as_deref(), Some("1234"));
        assert!(container.env_from.is_some());
    }

    #[test]
    fn rolling_update_keeps_quarter_margins() {
        let d = deployment(&cluster(), RegistryKind::Plugin, None);
        let spec = d.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.revision_history_limit, Some(2));
        let rolling = spec.strategy.unwrap().rolling_update.unwrap();
        assert_eq!(
            rolling.max_surge,
            Some(IntOrString::String("25%".to_string()))
        );
        assert_eq!(
            rolling.max_unavailable,
            Some(IntOrString::String("25%".to_string()))
        );
    }

    #[test]
    fn probe_paths_differ_per_registry() {
        assert_eq!(RegistryKind::Devfile.probe_path(), "/devfiles/");
        assert_eq!(RegistryKind::Plugin.probe_path(), "/v3/plugins/");
    }

    #[test]
    fn airgap_configmap_only_with_mirror() {
        assert!(airgap_config_map(&cluster(), RegistryKind::Devfile).is_none());
        let mut c = cluster();
        c.spec.server.air_gap_container_registry_hostname = Some("mirror.local".to_string());
        c.spec.server.air_gap_container_registry_organization = Some("eclipse".to_string());
        let cm = airgap_config_map(&c, RegistryKind::Devfile).unwrap();
        let data = cm.data.unwrap();
        assert_eq!(data["CHE_SIDECAR_CONTAINERS_REGISTRY_URL"], "mirror.local");
        assert_eq!(
            data["CHE_SIDECAR_CONTAINERS_REGISTRY_ORGANIZATION"],
            "eclipse"
        );
    }

    #[test]
    fn external_mode_reads_cr_flags() {
        let mut c = cluster();
        c.spec.server.external_plugin_registry = true;
        c.spec.server.plugin_registry_url = Some("https://plugins.example.com".to_string());
        assert!(RegistryKind::Plugin.external(&c));
        assert_eq!(
            RegistryKind::Plugin.url_override(&c),
            Some("https://plugins.example.com")
        );
        assert!(!RegistryKind::Devfile.external(&c));
    }
}
