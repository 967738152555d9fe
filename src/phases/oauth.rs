//! OpenShift OAuth integration.
//!
//! Registers Che as an OAuthClient with the cluster authorization server
//! and, on clusters that have no identity provider configured at all,
//! provisions an initial HTPasswd user so the administrator can log in at
//! least once. Both artifacts are cluster-scoped or live in foreign
//! namespaces, so cleanup runs through finalizers instead of garbage
//! collection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams, PostParams};
use kube::core::ObjectMeta;
use kube::Api;
use tracing::{info, warn};

use crate::controller::context::DeployContext;
use crate::controller::error::{is_kube_conflict, Error, Result};
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::controller::status;
use crate::crd::openshift::{
    HTPasswdIdentityProvider, Identity, IdentityProviderEntry, OAuth, OAuthClient,
    SecretNameReference, User,
};
use crate::resources::common::FIELD_MANAGER;
use crate::sync;
use crate::sync::DiffOpts;
use crate::util::htpasswd::generate_htpasswd;
use crate::util::password::generate_password;

/// Identity provider entry managed on the cluster OAuth object
pub const HTPASSWD_IDP_NAME: &str = "htpasswd-che";
/// Login name of the initial user
pub const INITIAL_USER: &str = "che-user";
/// Credentials of the initial user, kept next to the CheCluster
const USER_CREDENTIALS_SECRET: &str = "openshift-oauth-user-credentials";
/// Namespace the OAuth server reads its htpasswd file data from
const OPENSHIFT_CONFIG_NS: &str = "openshift-config";

pub struct OAuthPhase;

#[async_trait]
impl Reconcilable for OAuthPhase {
    fn name(&self) -> &'static str {
        "openshift-oauth"
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        if !ctx.openshift_oauth_enabled() {
            // Integration switched off after having been provisioned
            if ctx
                .che_cluster
                .status
                .as_ref()
                .is_some_and(|s| s.open_shift_o_auth_provisioned)
            {
                remove_oauth_client(ctx).await?;
                status::update_status(ctx, |s| s.open_shift_o_auth_provisioned = false).await?;
            }
            return Ok(PhaseResult::done());
        }

        let (client_name, client_secret) = ensure_client_identity(ctx).await?;
        let blueprint = oauth_client(&client_name, &client_secret, &ctx.che_host);
        sync::sync_cluster_scoped::<OAuthClient>(ctx, blueprint, &DiffOpts::default()).await?;
        if !ctx
            .che_cluster
            .status
            .as_ref()
            .is_some_and(|s| s.open_shift_o_auth_provisioned)
        {
            status::update_status(ctx, |s| s.open_shift_o_auth_provisioned = true).await?;
        }

        match ctx.che_cluster.spec.auth.initial_open_shift_o_auth_user {
            Some(true) => ensure_initial_user(ctx).await?,
            Some(false) => remove_initial_user(ctx).await?,
            None => {}
        }

        Ok(PhaseResult::done())
    }

    async fn finalize(&self, ctx: &mut DeployContext) -> bool {
        let client_ok = remove_oauth_client(ctx).await.is_ok();
        let user_ok = remove_initial_user(ctx).await.is_ok();
        client_ok && user_ok
    }
}

/// Cluster-scoped OAuthClient registering Che with the authorization server
fn oauth_client(name: &str, secret: &str, che_host: &str) -> OAuthClient {
    OAuthClient {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        secret: Some(secret.to_string()),
        redirect_uris: vec![format!("https://{che_host}/oauth/callback")],
        grant_method: Some("prompt".to_string()),
        access_token_max_age_seconds: Some(86400),
        access_token_inactivity_timeout_seconds: None,
        ..Default::default()
    }
}

/// The OAuthClient name and shared secret are generated once and written
/// back to the CR spec so they survive operator restarts.
async fn ensure_client_identity(ctx: &mut DeployContext) -> Result<(String, String)> {
    let auth = &ctx.che_cluster.spec.auth;
    let mut name = auth.o_auth_client_name.clone().filter(|n| !n.is_empty());
    let mut secret = auth.o_auth_secret.clone().filter(|s| !s.is_empty());
    if let (Some(name), Some(secret)) = (name.as_ref(), secret.as_ref()) {
        return Ok((name.clone(), secret.clone()));
    }

    let generated_name = name
        .take()
        .unwrap_or_else(|| format!("{}-openshift-identity-provider", ctx.namespace));
    let generated_secret = secret.take().unwrap_or_else(|| generate_password(12));
    let n = generated_name.clone();
    let s = generated_secret.clone();
    status::update_spec(ctx, "auth.oAuthClientName", move |cr| {
        cr.spec.auth.o_auth_client_name = Some(n.clone());
        cr.spec.auth.o_auth_secret = Some(s.clone());
    })
    .await?;
    Ok((generated_name, generated_secret))
}

async fn remove_oauth_client(ctx: &DeployContext) -> Result<()> {
    if let Some(name) = ctx
        .che_cluster
        .spec
        .auth
        .o_auth_client_name
        .as_deref()
        .filter(|n| !n.is_empty())
    {
        sync::delete_cluster_scoped::<OAuthClient>(ctx, name).await?;
    }
    Ok(())
}

/// Provision the initial HTPasswd user when the cluster has no identity
/// provider at all.
async fn ensure_initial_user(ctx: &mut DeployContext) -> Result<()> {
    let Some(oauth) = sync::get_cluster_scoped::<OAuth>(ctx, "cluster").await? else {
        warn!("Cluster OAuth object not found, skipping initial user");
        return Ok(());
    };
    let providers = oauth.spec.identity_providers.clone().unwrap_or_default();
    let ours = providers.iter().any(|p| p.name == HTPASSWD_IDP_NAME);
    if !providers.is_empty() && !ours {
        // Administrator already configured identity, nothing to bootstrap
        return Ok(());
    }

    let password = ensure_user_credentials(ctx).await?;
    let htpasswd = generate_htpasswd(INITIAL_USER, &password).await?;
    ensure_htpasswd_secret(ctx, &htpasswd).await?;

    if !ours {
        let entry = IdentityProviderEntry {
            name: HTPASSWD_IDP_NAME.to_string(),
            mapping_method: "claim".to_string(),
            type_: "HTPasswd".to_string(),
            htpasswd: Some(HTPasswdIdentityProvider {
                file_data: SecretNameReference {
                    name: HTPASSWD_IDP_NAME.to_string(),
                },
            }),
        };
        patch_identity_providers(ctx, |list| {
            if !list.iter().any(|p| p.name == HTPASSWD_IDP_NAME) {
                list.push(entry.clone());
            }
        })
        .await?;
        info!(user = INITIAL_USER, "Registered initial HTPasswd identity provider");
    }
    Ok(())
}

/// Generate-once password for the initial user, mirrored into
/// openshift-config so the OAuth server can read it. No owner references:
/// foreign-namespace objects cannot be garbage collected by our CR.
async fn ensure_user_credentials(ctx: &DeployContext) -> Result<String> {
    let mirror_api: Api<Secret> = Api::namespaced(ctx.client.clone(), OPENSHIFT_CONFIG_NS);
    let local_api: Api<Secret> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let password = stored_password(
        mirror_api.get_opt(USER_CREDENTIALS_SECRET).await?.as_ref(),
        local_api.get_opt(USER_CREDENTIALS_SECRET).await?.as_ref(),
    );
    let generated = password.is_none();
    let password = match password {
        Some(p) => p,
        None => generate_password(12),
    };
    let blueprint = |namespace: &str| Secret {
        metadata: ObjectMeta {
            name: Some(USER_CREDENTIALS_SECRET.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([
            ("user".to_string(), INITIAL_USER.to_string()),
            ("password".to_string(), password.clone()),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    // A deleted copy is restored from the surviving one
    create_secret_if_absent(ctx, OPENSHIFT_CONFIG_NS, blueprint(OPENSHIFT_CONFIG_NS)).await?;
    create_secret_if_absent(ctx, &ctx.namespace, blueprint(&ctx.namespace)).await?;
    if generated {
        info!(secret = USER_CREDENTIALS_SECRET, "Generated initial user credentials");
    }
    Ok(password)
}

/// The mirror in openshift-config is authoritative: the OAuth server reads
/// it and the htpasswd hash was derived from it. The copy in the CR
/// namespace is only surfaced for the administrator and may have been
/// deleted independently.
fn stored_password(mirror: Option<&Secret>, local: Option<&Secret>) -> Option<String> {
    [mirror, local].into_iter().flatten().find_map(|secret| {
        let bytes = secret.data.as_ref()?.get("password")?;
        String::from_utf8(bytes.0.clone()).ok()
    })
}

/// htpasswd output is salted, so the secret is only written when absent;
/// rewriting it every tick would roll the OAuth server for nothing.
async fn ensure_htpasswd_secret(ctx: &DeployContext, htpasswd: &str) -> Result<()> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(HTPASSWD_IDP_NAME.to_string()),
            namespace: Some(OPENSHIFT_CONFIG_NS.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "htpasswd".to_string(),
            ByteString(htpasswd.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    create_secret_if_absent(ctx, OPENSHIFT_CONFIG_NS, secret).await
}

async fn create_secret_if_absent(
    ctx: &DeployContext,
    namespace: &str,
    secret: Secret,
) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    match api.create(&PostParams::default(), &secret).await {
        Ok(_) => Ok(()),
        Err(e) if is_kube_conflict(&e) => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// Merge-patch the identityProviders list on the cluster OAuth object.
async fn patch_identity_providers<F>(ctx: &DeployContext, mutate: F) -> Result<()>
where
    F: Fn(&mut Vec<IdentityProviderEntry>),
{
    let api: Api<OAuth> = Api::all(ctx.client.clone());
    let oauth = api.get("cluster").await?;
    let mut providers = oauth.spec.identity_providers.unwrap_or_default();
    mutate(&mut providers);
    let patch = serde_json::json!({ "spec": { "identityProviders": providers } });
    api.patch(
        "cluster",
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Tear down everything the initial user bootstrap created. Idempotent.
async fn remove_initial_user(ctx: &DeployContext) -> Result<()> {
    if sync::get_cluster_scoped::<OAuth>(ctx, "cluster").await?.is_some() {
        patch_identity_providers(ctx, |list| {
            list.retain(|p| p.name != HTPASSWD_IDP_NAME);
        })
        .await?;
    }
    sync::delete_cluster_scoped::<Identity>(
        ctx,
        &format!("{HTPASSWD_IDP_NAME}:{INITIAL_USER}"),
    )
    .await?;
    sync::delete_cluster_scoped::<User>(ctx, INITIAL_USER).await?;
    sync::delete::<Secret>(ctx, &ctx.namespace, USER_CREDENTIALS_SECRET).await?;

    let config_ns: Api<Secret> = Api::namespaced(ctx.client.clone(), OPENSHIFT_CONFIG_NS);
    for name in [USER_CREDENTIALS_SECRET, HTPASSWD_IDP_NAME] {
        match config_ns.delete(name, &Default::default()).await {
            Ok(_) => {}
            Err(e) if crate::controller::error::is_kube_not_found(&e) => {}
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_secret(password: &str) -> Secret {
        Secret {
            data: Some(BTreeMap::from([(
                "password".to_string(),
                ByteString(password.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn mirrored_password_wins_over_the_local_copy() {
        let mirror = password_secret("from-mirror");
        let local = password_secret("from-local");
        assert_eq!(
            stored_password(Some(&mirror), Some(&local)).as_deref(),
            Some("from-mirror")
        );
    }

    #[test]
    fn local_copy_is_the_fallback() {
        let local = password_secret("from-local");
        assert_eq!(
            stored_password(None, Some(&local)).as_deref(),
            Some("from-local")
        );
        assert_eq!(stored_password(None, None), None);
    }

    #[test]
    fn oauth_client_redirects_to_the_che_callback() {
        let client = oauth_client("che-client", "s3cret", "che-eclipse-che.apps.example.com");
        assert_eq!(
            client.redirect_uris,
            vec!["https://che-eclipse-che.apps.example.com/oauth/callback".to_string()]
        );
        assert_eq!(client.secret.as_deref(), Some("s3cret"));
        assert_eq!(client.grant_method.as_deref(), Some("prompt"));
        assert_eq!(client.access_token_max_age_seconds, Some(86400));
    }
}
