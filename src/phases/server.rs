//! Che server deployment, configuration, and public URL.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use tracing::{debug, info};

use crate::controller::context::DeployContext;
use crate::controller::error::Result;
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::controller::status;
use crate::crd::ChePhase;
use crate::phases::database;
use crate::resources::server::{self, CHE_CONFIG_MAP, CHE_HOST_SERVICE, CHE_PORT};
use crate::sync;
use crate::sync::DiffOpts;

const WAIT_INTERVAL: Duration = Duration::from_secs(5);

pub struct ServerPhase;

#[async_trait]
impl Reconcilable for ServerPhase {
    fn name(&self) -> &'static str {
        "che-server"
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        // The exposure object carries the flavor name, not "che-host"
        let component = ctx.flavor().to_string();
        let cluster = ctx.che_cluster.clone();
        sync::sync::<Service>(ctx, server::service(&cluster), &DiffOpts::default()).await?;
        let Some(host) = super::expose_component(ctx, &component, CHE_HOST_SERVICE, CHE_PORT).await?
        else {
            debug!("Che server host not assigned yet");
            return Ok(PhaseResult::requeue(WAIT_INTERVAL));
        };
        if host != ctx.che_host {
            ctx.che_host = host.clone();
        }
        publish_host(ctx, &host).await?;

        // Re-clone: publish_host may have refreshed the CR handle
        let cluster = ctx.che_cluster.clone();
        let st = cluster.status.clone().unwrap_or_default();
        let db_secret = database::credentials_secret_name(&cluster);
        let inputs = server::ServerInputs {
            che_host: &ctx.che_host,
            scheme: ctx.url_scheme(),
            is_openshift: ctx.is_openshift,
            identity_provider_url: st.keycloak_url.as_deref(),
            devfile_registry_url: st.devfile_registry_url.as_deref(),
            plugin_registry_url: st.plugin_registry_url.as_deref(),
            db_secret: db_secret.as_deref(),
        };

        sync::sync::<ConfigMap>(ctx, server::config_map(&cluster, &inputs), &DiffOpts::default())
            .await?;
        // The revision is pinned into the pod template so config edits roll
        // the deployment
        let live_cm: Option<ConfigMap> = sync::get(ctx, &ctx.namespace, CHE_CONFIG_MAP).await?;
        let cm_revision = live_cm
            .and_then(|cm| cm.metadata.resource_version)
            .unwrap_or_default();

        sync::sync::<Deployment>(
            ctx,
            server::deployment(&cluster, &inputs, &cm_revision),
            &DiffOpts::default(),
        )
        .await?;

        let live: Option<Deployment> = sync::get(ctx, &ctx.namespace, &component).await?;
        let phase = live
            .as_ref()
            .map(server::rollout_phase)
            .unwrap_or(ChePhase::Unavailable);
        status::set_phase(ctx, phase.clone()).await?;
        if phase != ChePhase::Available {
            return Ok(PhaseResult::requeue(WAIT_INTERVAL));
        }

        publish_url(ctx).await?;
        Ok(PhaseResult::done())
    }

    async fn finalize(&self, _ctx: &mut DeployContext) -> bool {
        true
    }
}

/// Persist a router-assigned host on the spec so the next tick starts from
/// the real value instead of the computed default.
async fn publish_host(ctx: &mut DeployContext, host: &str) -> Result<()> {
    let current = ctx
        .che_cluster
        .spec
        .server
        .che_host
        .as_deref()
        .unwrap_or_default();
    if current == host {
        return Ok(());
    }
    let host = host.to_string();
    status::update_spec(ctx, "server.cheHost", move |cr| {
        cr.spec.server.che_host = Some(host.clone());
    })
    .await
}

async fn publish_url(ctx: &mut DeployContext) -> Result<()> {
    let url = format!("{}://{}", ctx.url_scheme(), ctx.che_host);
    let version = server::effective_image(&ctx.che_cluster)
        .rsplit_once(':')
        .map(|(_, tag)| tag.to_string());
    let current = ctx.che_cluster.status.clone().unwrap_or_default();
    if current.che_url.as_deref() == Some(url.as_str()) && current.che_version == version {
        return Ok(());
    }
    info!(url = %url, "Che server is available");
    status::update_status(ctx, move |s| {
        s.che_url = Some(url.clone());
        s.che_version = version.clone();
    })
    .await
}
