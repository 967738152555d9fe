//! Unit tests for the per-component resource builders.
//!
//! Service selectors must match the pod labels of the deployment they
//! front, otherwise a component silently loses its endpoint.

use crate::common::{test_cluster, test_cluster_with, TEST_NAMESPACE};
use che_operator::crd::ContainerResources;
use che_operator::crd::ResourceList;
use che_operator::resources::{keycloak, postgres, registry, server, tls};
use che_operator::resources::registry::RegistryKind;

mod postgres_tests {
    use super::*;

    #[test]
    fn service_selector_matches_pod_labels() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let service = postgres::service(&cluster);
        let deployment = postgres::deployment(&cluster, Some(postgres::POSTGRES_SECRET));

        let selector = service.spec.unwrap().selector.unwrap();
        let pod_labels = deployment
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .labels
            .unwrap();
        for (key, value) in &selector {
            assert_eq!(pod_labels.get(key), Some(value), "selector key {key}");
        }
    }

    #[test]
    fn pvc_size_follows_the_spec() {
        let cluster = test_cluster_with(|spec| {
            spec.storage.pvc_claim_size = "20Gi".to_string();
        });
        let pvc = postgres::data_pvc(&cluster);
        let storage = pvc
            .spec
            .unwrap()
            .resources
            .unwrap()
            .requests
            .unwrap()
            .get("storage")
            .cloned()
            .unwrap();
        assert_eq!(storage.0, "20Gi");
    }

    #[test]
    fn resource_overrides_reach_the_container() {
        let cluster = test_cluster_with(|spec| {
            spec.database.che_postgres_container_resources = Some(ContainerResources {
                requests: Some(ResourceList {
                    cpu: Some("200m".to_string()),
                    memory: Some("768Mi".to_string()),
                }),
                limits: None,
            });
        });
        let deployment = postgres::deployment(&cluster, None);
        let container = deployment.spec.unwrap().template.spec.unwrap().containers[0].clone();
        let requests = container.resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("cpu").unwrap().0, "200m");
        assert_eq!(requests.get("memory").unwrap().0, "768Mi");
    }
}

mod keycloak_tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn service_selector_matches_pod_labels() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let service = keycloak::service(&cluster);
        let inputs = keycloak::KeycloakDeployment {
            che_host: "che-eclipse-che.apps.example.com",
            proxy_cli: None,
            github_secret: None,
            referenced_versions: &BTreeMap::new(),
        };
        let deployment = keycloak::deployment(&cluster, &inputs);

        let selector = service.spec.unwrap().selector.unwrap();
        let pod_labels = deployment
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .labels
            .unwrap();
        for (key, value) in &selector {
            assert_eq!(pod_labels.get(key), Some(value), "selector key {key}");
        }
    }

    #[test]
    fn referenced_versions_become_pod_annotations() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let versions = BTreeMap::from([
            ("che-identity-secret".to_string(), "41".to_string()),
            ("github-oauth".to_string(), "7".to_string()),
        ]);
        let inputs = keycloak::KeycloakDeployment {
            che_host: "che.example.com",
            proxy_cli: None,
            github_secret: Some("github-oauth"),
            referenced_versions: &versions,
        };
        let deployment = keycloak::deployment(&cluster, &inputs);
        let annotations = deployment
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap();
        assert_eq!(
            annotations
                .get(&keycloak::revision_annotation("che-identity-secret"))
                .map(String::as_str),
            Some("41")
        );
        assert_eq!(
            annotations
                .get(&keycloak::revision_annotation("github-oauth"))
                .map(String::as_str),
            Some("7")
        );
    }

    #[test]
    fn proxy_step_runs_before_the_entrypoint() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let proxy = "export HTTP_PROXY='http://proxy:3128'";
        let command = keycloak::start_command(&cluster, "che.example.com", Some(proxy));
        let proxy_at = command.find(proxy).expect("proxy export present");
        let entrypoint_at = command
            .find("docker-entrypoint.sh")
            .expect("entrypoint present");
        assert!(proxy_at < entrypoint_at);
    }
}

mod registry_tests {
    use super::*;

    #[test]
    fn airgap_config_absent_by_default() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        assert!(registry::airgap_config_map(&cluster, RegistryKind::Devfile).is_none());
    }

    #[test]
    fn devfile_and_plugin_registries_get_distinct_objects() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let devfile = registry::deployment(&cluster, RegistryKind::Devfile, None);
        let plugin = registry::deployment(&cluster, RegistryKind::Plugin, None);
        assert_eq!(devfile.metadata.name.as_deref(), Some("devfile-registry"));
        assert_eq!(plugin.metadata.name.as_deref(), Some("plugin-registry"));
    }

    #[test]
    fn cm_revision_is_pinned_as_env() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let deployment = registry::deployment(&cluster, RegistryKind::Plugin, Some("93"));
        let container = deployment.spec.unwrap().template.spec.unwrap().containers[0].clone();
        let revision = container
            .env
            .unwrap()
            .into_iter()
            .find(|e| e.name == "CM_REVISION")
            .unwrap();
        assert_eq!(revision.value.as_deref(), Some("93"));
    }
}

mod server_tests {
    use super::*;

    fn inputs() -> server::ServerInputs<'static> {
        server::ServerInputs {
            che_host: "che-eclipse-che.apps.example.com",
            scheme: "https",
            is_openshift: true,
            identity_provider_url: None,
            devfile_registry_url: None,
            plugin_registry_url: None,
            db_secret: None,
        }
    }

    #[test]
    fn service_exposes_http_and_metrics() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let service = server::service(&cluster);
        let ports = service.spec.unwrap().ports.unwrap();
        let numbers: Vec<i32> = ports.iter().map(|p| p.port).collect();
        assert!(numbers.contains(&8080));
        assert!(numbers.contains(&8087));
    }

    #[test]
    fn deployment_runs_under_the_che_service_account() {
        let cluster = test_cluster("eclipse-che", TEST_NAMESPACE);
        let deployment = server::deployment(&cluster, &inputs(), "1");
        let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.service_account_name.as_deref(), Some("che"));
    }

    #[test]
    fn image_tag_is_not_doubled() {
        let cluster = test_cluster_with(|spec| {
            spec.server.che_image = Some("quay.io/eclipse/che-server:pinned".to_string());
            spec.server.che_image_tag = Some("ignored".to_string());
        });
        assert_eq!(
            server::effective_image(&cluster),
            "quay.io/eclipse/che-server:pinned"
        );
    }
}

mod tls_tests {
    use super::*;

    #[test]
    fn job_signs_for_the_whole_ingress_domain() {
        let cluster = test_cluster_with(|spec| {
            spec.k8s.ingress_domain = Some("192.168.99.1.nip.io".to_string());
        });
        let job = tls::tls_job(&cluster);
        let container = job
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .containers[0]
            .clone();
        let domain = container
            .env
            .unwrap()
            .into_iter()
            .find(|e| e.name == "DOMAIN")
            .unwrap();
        assert_eq!(domain.value.as_deref(), Some("*.192.168.99.1.nip.io"));
    }
}
