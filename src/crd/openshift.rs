//! OpenShift API objects the operator reads or writes.
//!
//! These kinds are served by OpenShift itself, not registered by this
//! operator. Route, OAuth and Proxy follow the usual spec/status shape and
//! use the `CustomResource` derive; OAuthClient, User and Identity are flat
//! objects (their fields live next to `metadata`) and implement
//! `kube::Resource` by hand.

use std::borrow::Cow;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ClusterResourceScope;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Route exposes a service at a host name (route.openshift.io/v1).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced,
    status = "RouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Host the route is served on. Left empty to let the router assign one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub to: RouteTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TLSConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: k8s_openapi::apimachinery::pkg::util::intstr::IntOrString,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TLSConfig {
    pub termination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Cluster OAuth configuration singleton named "cluster"
/// (config.openshift.io/v1).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "OAuth",
    plural = "oauths"
)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_providers: Option<Vec<IdentityProviderEntry>>,
}

/// One identityProviders entry on the cluster OAuth object. Only the
/// HTPasswd shape the operator manages is modelled.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderEntry {
    pub name: String,
    pub mapping_method: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htpasswd: Option<HTPasswdIdentityProvider>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HTPasswdIdentityProvider {
    pub file_data: SecretNameReference,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretNameReference {
    pub name: String,
}

/// Cluster proxy configuration singleton named "cluster"
/// (config.openshift.io/v1).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Proxy",
    plural = "proxies",
    status = "ProxyStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

/// OAuthClient registers Che as an OAuth client with the OpenShift
/// authorization server (oauth.openshift.io/v1). Flat, cluster-scoped.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClient {
    #[serde(default = "oauth_client_api_version", rename = "apiVersion")]
    pub api_version: String,
    #[serde(default = "oauth_client_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    #[serde(
        default,
        rename = "redirectURIs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_max_age_seconds: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_inactivity_timeout_seconds: Option<i32>,
}

fn oauth_client_api_version() -> String {
    "oauth.openshift.io/v1".to_string()
}

fn oauth_client_kind() -> String {
    "OAuthClient".to_string()
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self {
            api_version: oauth_client_api_version(),
            kind: oauth_client_kind(),
            metadata: ObjectMeta::default(),
            secret: None,
            redirect_uris: Vec::new(),
            grant_method: None,
            access_token_max_age_seconds: None,
            access_token_inactivity_timeout_seconds: None,
        }
    }
}

impl kube::Resource for OAuthClient {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "OAuthClient".into()
    }
    fn group(_: &()) -> Cow<'_, str> {
        "oauth.openshift.io".into()
    }
    fn version(_: &()) -> Cow<'_, str> {
        "v1".into()
    }
    fn plural(_: &()) -> Cow<'_, str> {
        "oauthclients".into()
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// User (user.openshift.io/v1). Flat, cluster-scoped.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default = "user_api_version", rename = "apiVersion")]
    pub api_version: String,
    #[serde(default = "user_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

fn user_api_version() -> String {
    "user.openshift.io/v1".to_string()
}

fn user_kind() -> String {
    "User".to_string()
}

impl Default for User {
    fn default() -> Self {
        Self {
            api_version: user_api_version(),
            kind: user_kind(),
            metadata: ObjectMeta::default(),
            identities: Vec::new(),
            full_name: None,
        }
    }
}

impl kube::Resource for User {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "User".into()
    }
    fn group(_: &()) -> Cow<'_, str> {
        "user.openshift.io".into()
    }
    fn version(_: &()) -> Cow<'_, str> {
        "v1".into()
    }
    fn plural(_: &()) -> Cow<'_, str> {
        "users".into()
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Identity ties a provider login to a User (user.openshift.io/v1).
/// Named "<provider>:<providerUserName>". Flat, cluster-scoped.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default = "identity_api_version", rename = "apiVersion")]
    pub api_version: String,
    #[serde(default = "identity_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,

    pub provider_name: String,
    pub provider_user_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ObjectReference>,
}

fn identity_api_version() -> String {
    "user.openshift.io/v1".to_string()
}

fn identity_kind() -> String {
    "Identity".to_string()
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            api_version: identity_api_version(),
            kind: identity_kind(),
            metadata: ObjectMeta::default(),
            provider_name: String::new(),
            provider_user_name: String::new(),
            user: None,
        }
    }
}

impl kube::Resource for Identity {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "Identity".into()
    }
    fn group(_: &()) -> Cow<'_, str> {
        "user.openshift.io".into()
    }
    fn version(_: &()) -> Cow<'_, str> {
        "v1".into()
    }
    fn plural(_: &()) -> Cow<'_, str> {
        "identities".into()
    }
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
