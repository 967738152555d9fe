use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CheCluster is the Schema for the checlusters API.
///
/// One CheCluster per namespace describes the desired state of the whole
/// workspaces platform: the Che server, its database, the identity provider,
/// the devfile and plugin registries, and how they are exposed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "org.eclipse.che",
    version = "v1",
    kind = "CheCluster",
    plural = "checlusters",
    namespaced,
    status = "CheClusterStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.cheClusterRunning"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.cheURL"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CheClusterSpec {
    /// Che server settings (host, image, TLS, exposure, registries)
    #[serde(default)]
    pub server: ServerSpec,

    /// Database settings (embedded PostgreSQL or an external database)
    #[serde(default)]
    pub database: DatabaseSpec,

    /// Authentication settings (embedded Keycloak, external IdP, OpenShift OAuth)
    #[serde(default)]
    pub auth: AuthSpec,

    /// Workspace storage settings
    #[serde(default)]
    pub storage: StorageSpec,

    /// Settings that only apply on plain Kubernetes
    #[serde(default)]
    pub k8s: K8sSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Public host name the Che server is exposed on. Computed from the
    /// exposure strategy and ingress domain when left empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_host: Option<String>,

    /// Flavor identifier used as name prefix for most objects
    #[serde(default = "default_che_flavor")]
    pub che_flavor: String,

    /// Serve every endpoint over TLS
    #[serde(default)]
    pub tls_support: bool,

    /// Che server image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_image: Option<String>,

    /// Che server image tag override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_image_tag: Option<String>,

    /// Memory request for the Che server container (e.g. "512Mi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_memory_request: Option<String>,

    /// Memory limit for the Che server container (e.g. "1Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_memory_limit: Option<String>,

    /// Forward proxy URL, e.g. "http://proxy.example.com"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// Forward proxy port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<String>,

    /// Hosts reached without going through the proxy, "|" separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_proxy_hosts: Option<String>,

    /// Proxy credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_password: Option<String>,

    /// Endpoint exposure strategy: "multi-host" (default) or "single-host"
    #[serde(default = "default_exposure_strategy")]
    pub server_exposure_strategy: String,

    /// ConfigMap with additional CA certificates to trust
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_trust_store_config_map_name: Option<String>,

    /// Namespace workspaces are created in. Rewritten to the CheCluster
    /// namespace when the broad permission probe fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_namespace_default: Option<String>,

    /// Allow workspaces in namespaces other than the CheCluster namespace
    #[serde(default)]
    pub allow_user_defined_workspace_namespaces: bool,

    /// Plugin registry image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_registry_image: Option<String>,

    /// URL of an externally managed plugin registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_registry_url: Option<String>,

    /// Do not deploy the plugin registry, use pluginRegistryUrl as-is
    #[serde(default)]
    pub external_plugin_registry: bool,

    /// Devfile registry image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile_registry_image: Option<String>,

    /// URL of an externally managed devfile registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile_registry_url: Option<String>,

    /// Do not deploy the devfile registry, use devfileRegistryUrl as-is
    #[serde(default)]
    pub external_devfile_registry: bool,

    /// Hostname of an air-gap container registry mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_gap_container_registry_hostname: Option<String>,

    /// Organization within the air-gap registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_gap_container_registry_organization: Option<String>,

    /// Point components at in-cluster service names instead of public URLs
    #[serde(default)]
    pub use_internal_cluster_svc_names: bool,
}

impl Default for ServerSpec {
    fn default() -> Self {
        Self {
            che_host: None,
            che_flavor: default_che_flavor(),
            tls_support: false,
            che_image: None,
            che_image_tag: None,
            server_memory_request: None,
            server_memory_limit: None,
            proxy_url: None,
            proxy_port: None,
            non_proxy_hosts: None,
            proxy_user: None,
            proxy_password: None,
            server_exposure_strategy: default_exposure_strategy(),
            server_trust_store_config_map_name: None,
            workspace_namespace_default: None,
            allow_user_defined_workspace_namespaces: false,
            plugin_registry_image: None,
            plugin_registry_url: None,
            external_plugin_registry: false,
            devfile_registry_image: None,
            devfile_registry_url: None,
            external_devfile_registry: false,
            air_gap_container_registry_hostname: None,
            air_gap_container_registry_organization: None,
            use_internal_cluster_svc_names: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Use an externally managed database instead of the embedded PostgreSQL
    #[serde(default)]
    pub external_db: bool,

    /// Database host ("postgres" when embedded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_postgres_host_name: Option<String>,

    /// Database port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_postgres_port: Option<String>,

    /// Database name
    #[serde(default = "default_postgres_db")]
    pub che_postgres_db: String,

    /// Database user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_postgres_user: Option<String>,

    /// Plain-text database password. Leave empty to have one generated into
    /// a secret (see chePostgresSecret).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_postgres_password: Option<String>,

    /// Name of a secret holding "user" and "password" keys, overriding the
    /// plain fields above
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_postgres_secret: Option<String>,

    /// PostgreSQL image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres_image: Option<String>,

    /// Container resources for the PostgreSQL pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_postgres_container_resources: Option<ContainerResources>,
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            external_db: false,
            che_postgres_host_name: None,
            che_postgres_port: None,
            che_postgres_db: default_postgres_db(),
            che_postgres_user: None,
            che_postgres_password: None,
            che_postgres_secret: None,
            postgres_image: None,
            che_postgres_container_resources: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Use an externally managed identity provider instead of deploying Keycloak
    #[serde(default)]
    pub external_identity_provider: bool,

    /// Identity provider URL (computed for the embedded provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_url: Option<String>,

    /// Realm provisioned in the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_realm: Option<String>,

    /// Client id provisioned in the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_client_id: Option<String>,

    /// Admin user of the embedded identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_admin_user_name: Option<String>,

    /// Plain-text admin password. Leave empty to have one generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_password: Option<String>,

    /// Name of a secret holding "user" and "password" keys for the admin user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_secret: Option<String>,

    /// Identity provider image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_image: Option<String>,

    /// Name of the OpenShift OAuthClient object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o_auth_client_name: Option<String>,

    /// Secret shared with the OpenShift OAuthClient object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o_auth_secret: Option<String>,

    /// Force the admin password to be updated on next reconcile
    #[serde(default)]
    pub update_admin_password: bool,

    /// Integrate with OpenShift OAuth. None means auto-detect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_shifto_auth: Option<bool>,

    /// Provision an initial HTPasswd user when the cluster has no identity
    /// provider configured. None means disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_open_shift_o_auth_user: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Workspace PVC strategy: "common", "per-workspace" or "unique"
    #[serde(default = "default_pvc_strategy")]
    pub pvc_strategy: String,

    /// Size of workspace claims (e.g. "1Gi")
    #[serde(default = "default_pvc_claim_size")]
    pub pvc_claim_size: String,

    /// Storage class for the PostgreSQL PVC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres_pvc_storage_class_name: Option<String>,

    /// Image of the PVC preparation jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_jobs_image: Option<String>,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            pvc_strategy: default_pvc_strategy(),
            pvc_claim_size: default_pvc_claim_size(),
            postgres_pvc_storage_class_name: None,
            pvc_jobs_image: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct K8sSpec {
    /// Global ingress domain, e.g. "192.168.99.101.nip.io"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_domain: Option<String>,

    /// Ingress class, defaults to "nginx"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class: Option<String>,

    /// Name of an externally provided TLS secret. When empty and TLS is on,
    /// a self-signed pair is generated by the TLS bootstrap job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
}

fn default_che_flavor() -> String {
    "che".to_string()
}

fn default_exposure_strategy() -> String {
    "multi-host".to_string()
}

fn default_postgres_db() -> String {
    "dbche".to_string()
}

fn default_pvc_strategy() -> String {
    "common".to_string()
}

fn default_pvc_claim_size() -> String {
    "1Gi".to_string()
}

/// Status of the CheCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheClusterStatus {
    /// Running phase of the platform
    #[serde(
        default,
        rename = "cheClusterRunning",
        skip_serializing_if = "Option::is_none"
    )]
    pub che_cluster_running: Option<ChePhase>,

    /// Public URL of the Che server
    #[serde(default, rename = "cheURL", skip_serializing_if = "Option::is_none")]
    pub che_url: Option<String>,

    /// Public URL of the identity provider
    #[serde(
        default,
        rename = "keycloakURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub keycloak_url: Option<String>,

    /// Public URL of the devfile registry
    #[serde(
        default,
        rename = "devfileRegistryURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub devfile_registry_url: Option<String>,

    /// Public URL of the plugin registry
    #[serde(
        default,
        rename = "pluginRegistryURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub plugin_registry_url: Option<String>,

    /// The embedded database has been provisioned for the identity provider
    #[serde(default)]
    pub db_provisoned: bool,

    /// The identity provider realm and client have been provisioned
    #[serde(default)]
    pub keycloak_provisoned: bool,

    /// The OpenShift OAuthClient has been provisioned
    #[serde(default, rename = "openShiftoAuthProvisioned")]
    pub open_shift_o_auth_provisioned: bool,

    /// GitHub OAuth credentials have been wired into the identity provider
    #[serde(default, rename = "gitHubOAuthProvisioned")]
    pub git_hub_o_auth_provisioned: bool,

    /// Observed Che server version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub che_version: Option<String>,

    /// Observed PostgreSQL major version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres_version: Option<String>,

    /// Machine-readable failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Documentation link for the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,

    /// Reference to a controller-generated credentials secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<String>,
}

/// Platform lifecycle phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub enum ChePhase {
    Available,
    Unavailable,
    #[serde(rename = "RollingUpdateInProgress")]
    RollingUpdateInProgress,
}

impl std::fmt::Display for ChePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChePhase::Available => write!(f, "Available"),
            ChePhase::Unavailable => write!(f, "Unavailable"),
            ChePhase::RollingUpdateInProgress => write!(f, "RollingUpdateInProgress"),
        }
    }
}

impl CheCluster {
    /// Effective workspace namespace: explicit default or the CR namespace.
    pub fn workspace_namespace(&self) -> String {
        self.spec
            .server
            .workspace_namespace_default
            .clone()
            .unwrap_or_else(|| {
                self.metadata
                    .namespace
                    .clone()
                    .unwrap_or_else(|| "default".to_string())
            })
    }

    /// Whether workspaces may live outside the CheCluster namespace. Drives
    /// the narrow-vs-broad permission strategy.
    pub fn workspaces_in_other_namespaces(&self) -> bool {
        let own_ns = self.metadata.namespace.clone().unwrap_or_default();
        self.spec.server.allow_user_defined_workspace_namespaces
            || self
                .spec
                .server
                .workspace_namespace_default
                .as_ref()
                .is_some_and(|ns| !ns.is_empty() && *ns != own_ns)
    }
}
