//! Embedded Keycloak deployment and realm/client provisioning.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::ListParams;
use kube::Api;
use tracing::{debug, info};

use crate::controller::context::DeployContext;
use crate::controller::error::{Error, Result};
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::controller::status;
use crate::resources::exposure::{self, ExposureBackend};
use crate::resources::keycloak::{
    self, IDENTITY_POSTGRES_SECRET, IDENTITY_SECRET, KEYCLOAK_NAME, KEYCLOAK_PORT,
};
use crate::resources::postgres::deployment_ready;
use crate::sync;
use crate::sync::DiffOpts;
use crate::util::env;
use crate::util::exec::{exec_in_pod, find_component_pod};
use crate::util::password::generate_password;
use crate::util::template;

const WAIT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_ADMIN_USER: &str = "admin";
/// Realm/client provisioning script shipped in the operator image
const REALM_TEMPLATE: &str = "keycloak_provision";
/// GitHub identity-provider wiring script
const GITHUB_TEMPLATE: &str = "oauth_provision";

pub struct IdentityProviderPhase;

#[async_trait]
impl Reconcilable for IdentityProviderPhase {
    fn name(&self) -> &'static str {
        "identity-provider"
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        if ctx.che_cluster.spec.auth.external_identity_provider {
            let url = ctx
                .che_cluster
                .spec
                .auth
                .identity_provider_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    Error::ValidationError(
                        "externalIdentityProvider requires identityProviderUrl".to_string(),
                    )
                })?;
            status::update_status(ctx, move |s| s.keycloak_url = Some(url.clone())).await?;
            return Ok(PhaseResult::done());
        }

        ensure_admin_secret(ctx).await?;

        let cluster = ctx.che_cluster.clone();
        sync::sync::<Service>(ctx, keycloak::service(&cluster), &DiffOpts::default()).await?;

        let Some(host) =
            super::expose_component(ctx, KEYCLOAK_NAME, KEYCLOAK_NAME, KEYCLOAK_PORT).await?
        else {
            debug!("Identity provider host not assigned yet");
            return Ok(PhaseResult::requeue(WAIT_INTERVAL));
        };
        let backend = ExposureBackend::select(
            ctx.is_openshift,
            &cluster.spec.server.server_exposure_strategy,
        );
        let url = format!(
            "{}/auth",
            exposure::public_url(backend, ctx.url_scheme(), &ctx.che_host, &host, KEYCLOAK_NAME)
        );
        let status_url = url.clone();
        status::update_status(ctx, move |s| s.keycloak_url = Some(status_url.clone())).await?;

        let github_secret = discover_github_secret(ctx).await?;
        let versions = referenced_versions(ctx, github_secret.as_deref()).await?;
        let che_host = ctx.che_host.clone();
        let proxy = proxy_cli(ctx);
        let inputs = keycloak::KeycloakDeployment {
            che_host: &che_host,
            proxy_cli: proxy.as_deref(),
            github_secret: github_secret.as_deref(),
            referenced_versions: &versions,
        };
        let blueprint = keycloak::deployment(&ctx.che_cluster, &inputs);
        sync::sync::<Deployment>(ctx, blueprint, &DiffOpts::default()).await?;

        let live: Option<Deployment> = sync::get(ctx, &ctx.namespace, KEYCLOAK_NAME).await?;
        if !live.as_ref().is_some_and(deployment_ready) {
            return Ok(PhaseResult::requeue(WAIT_INTERVAL));
        }

        let st = ctx.che_cluster.status.clone().unwrap_or_default();
        if !st.keycloak_provisoned {
            provision_realm(ctx, &url).await?;
            status::update_status(ctx, |s| s.keycloak_provisoned = true).await?;
        }
        if github_secret.is_some() && !st.git_hub_o_auth_provisioned {
            provision_github(ctx).await?;
            status::update_status(ctx, |s| s.git_hub_o_auth_provisioned = true).await?;
        }

        Ok(PhaseResult::done())
    }

    async fn finalize(&self, _ctx: &mut DeployContext) -> bool {
        true
    }
}

async fn ensure_admin_secret(ctx: &mut DeployContext) -> Result<()> {
    // An administrator-supplied secret overrides the generated one
    if ctx
        .che_cluster
        .spec
        .auth
        .identity_provider_secret
        .as_deref()
        .is_some_and(|s| !s.is_empty())
    {
        return Ok(());
    }
    let existing: Option<Secret> = sync::get(ctx, &ctx.namespace, IDENTITY_SECRET).await?;
    let force_update = ctx.che_cluster.spec.auth.update_admin_password;
    if existing.is_none() || force_update {
        let user = ctx
            .che_cluster
            .spec
            .auth
            .identity_provider_admin_user_name
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_USER.to_string());
        let password = ctx
            .che_cluster
            .spec
            .auth
            .identity_provider_password
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| generate_password(12));
        info!(secret = IDENTITY_SECRET, "Writing identity provider admin credentials");
        sync::sync::<Secret>(
            ctx,
            keycloak::identity_secret(&ctx.che_cluster, &user, &password),
            &DiffOpts::default(),
        )
        .await?;
        if force_update {
            status::update_spec(ctx, "auth.updateAdminPassword", |cr| {
                cr.spec.auth.update_admin_password = false;
            })
            .await?;
        }
    }
    Ok(())
}

/// Look for a GitHub OAuth configuration secret by label and annotation.
async fn discover_github_secret(ctx: &DeployContext) -> Result<Option<String>> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let lp = ListParams::default().labels(&keycloak::github_oauth_selector());
    let found = api
        .list(&lp)
        .await?
        .items
        .into_iter()
        .find(keycloak::is_github_oauth_secret);
    Ok(found.and_then(|s| s.metadata.name))
}

/// resourceVersions of every referenced secret/configmap; pinned as pod
/// annotations so edits roll the deployment.
async fn referenced_versions(
    ctx: &DeployContext,
    github_secret: Option<&str>,
) -> Result<BTreeMap<String, String>> {
    let mut versions = BTreeMap::new();
    let mut secrets = vec![IDENTITY_SECRET.to_string(), IDENTITY_POSTGRES_SECRET.to_string()];
    if let Some(name) = &ctx.che_cluster.spec.auth.identity_provider_secret {
        if !name.is_empty() {
            secrets.push(name.clone());
        }
    }
    if let Some(github) = github_secret {
        secrets.push(github.to_string());
    }
    for name in secrets {
        if let Some(secret) = sync::get::<Secret>(ctx, &ctx.namespace, &name).await? {
            if let Some(rv) = secret.metadata.resource_version {
                versions.insert(name, rv);
            }
        }
    }
    if let Some(cm_name) = &ctx.che_cluster.spec.server.server_trust_store_config_map_name {
        if let Some(cm) = sync::get::<ConfigMap>(ctx, &ctx.namespace, cm_name).await? {
            if let Some(rv) = cm.metadata.resource_version {
                versions.insert(cm_name.clone(), rv);
            }
        }
    }
    Ok(versions)
}

fn proxy_cli(ctx: &DeployContext) -> Option<String> {
    if !ctx.proxy.is_configured() {
        return None;
    }
    let http = ctx.proxy.http_proxy.clone().unwrap_or_default();
    let https = ctx.proxy.https_proxy.clone().unwrap_or_default();
    let no_proxy = ctx.proxy.no_proxy.clone().unwrap_or_default();
    Some(format!(
        "export HTTP_PROXY='{http}' HTTPS_PROXY='{https}' NO_PROXY='{no_proxy}'"
    ))
}

/// Render the provisioning script and run it inside the Keycloak pod.
async fn provision_realm(ctx: &DeployContext, keycloak_url: &str) -> Result<()> {
    if env::mock_api() {
        return Ok(());
    }
    let selector = format!("app={},component={KEYCLOAK_NAME}", ctx.flavor());
    let Some(pod) = find_component_pod(&ctx.client, &ctx.namespace, &selector).await? else {
        return Err(Error::ExecError {
            pod: KEYCLOAK_NAME.to_string(),
            message: "no running Keycloak pod found".to_string(),
        });
    };

    let cluster = &ctx.che_cluster;
    let realm = cluster
        .spec
        .auth
        .identity_provider_realm
        .clone()
        .unwrap_or_else(|| ctx.flavor().to_string());
    let client_id = cluster
        .spec
        .auth
        .identity_provider_client_id
        .clone()
        .unwrap_or_else(|| format!("{}-public", ctx.flavor()));
    let template = template::load_template(REALM_TEMPLATE)?;
    let script = template::render(
        &template,
        &[
            ("realm", realm.as_str()),
            ("client_id", client_id.as_str()),
            ("che_host", ctx.che_host.as_str()),
            ("scheme", ctx.url_scheme()),
            ("keycloak_url", keycloak_url),
        ],
    );
    info!(pod = %pod, "Provisioning identity provider realm and client");
    exec_in_pod(&ctx.client, &ctx.namespace, &pod, KEYCLOAK_NAME, &script).await?;
    Ok(())
}

async fn provision_github(ctx: &DeployContext) -> Result<()> {
    if env::mock_api() {
        return Ok(());
    }
    let selector = format!("app={},component={KEYCLOAK_NAME}", ctx.flavor());
    let Some(pod) = find_component_pod(&ctx.client, &ctx.namespace, &selector).await? else {
        return Err(Error::ExecError {
            pod: KEYCLOAK_NAME.to_string(),
            message: "no running Keycloak pod found".to_string(),
        });
    };
    let template = template::load_template(GITHUB_TEMPLATE)?;
    let script = template::render(&template, &[("che_host", ctx.che_host.as_str())]);
    info!(pod = %pod, "Wiring GitHub OAuth into the identity provider");
    exec_in_pod(&ctx.client, &ctx.namespace, &pod, KEYCLOAK_NAME, &script).await?;
    Ok(())
}
