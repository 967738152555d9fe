//! Devfile and plugin registry phases, one parameterized implementation
//! registered twice.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use tracing::debug;

use crate::controller::context::DeployContext;
use crate::controller::error::Result;
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::controller::status;
use crate::resources::exposure::{self, ExposureBackend};
use crate::resources::registry::{self, RegistryKind, REGISTRY_PORT};
use crate::sync;
use crate::sync::DiffOpts;

const WAIT_INTERVAL: Duration = Duration::from_secs(5);

pub struct RegistryPhase {
    kind: RegistryKind,
}

impl RegistryPhase {
    pub fn new(kind: RegistryKind) -> Self {
        Self { kind }
    }

    /// Publish the registry URL on status. Written only when known; a
    /// transient exposure hiccup never clears an already published URL.
    async fn publish_url(&self, ctx: &mut DeployContext, url: String) -> Result<()> {
        let current = ctx.che_cluster.status.as_ref().and_then(|s| match self.kind {
            RegistryKind::Devfile => s.devfile_registry_url.clone(),
            RegistryKind::Plugin => s.plugin_registry_url.clone(),
        });
        if current.as_deref() == Some(url.as_str()) {
            return Ok(());
        }
        let kind = self.kind;
        status::update_status(ctx, move |s| match kind {
            RegistryKind::Devfile => s.devfile_registry_url = Some(url.clone()),
            RegistryKind::Plugin => s.plugin_registry_url = Some(url.clone()),
        })
        .await
    }
}

#[async_trait]
impl Reconcilable for RegistryPhase {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        if self.kind.external(&ctx.che_cluster) {
            if let Some(url) = self.kind.url_override(&ctx.che_cluster) {
                self.publish_url(ctx, url.to_string()).await?;
            }
            debug!(registry = self.kind.name(), "Externally managed, skipping");
            return Ok(PhaseResult::done());
        }

        let cluster = ctx.che_cluster.clone();
        sync::sync::<Service>(ctx, registry::service(&cluster, self.kind), &DiffOpts::default())
            .await?;

        let Some(host) =
            super::expose_component(ctx, self.kind.name(), self.kind.name(), REGISTRY_PORT).await?
        else {
            debug!(registry = self.kind.name(), "Host not assigned yet");
            return Ok(PhaseResult::requeue(WAIT_INTERVAL));
        };
        let backend = ExposureBackend::select(
            ctx.is_openshift,
            &cluster.spec.server.server_exposure_strategy,
        );
        let url = exposure::public_url(
            backend,
            ctx.url_scheme(),
            &ctx.che_host,
            &host,
            self.kind.name(),
        );
        self.publish_url(ctx, url).await?;

        let mut cm_revision = None;
        if let Some(cm) = registry::airgap_config_map(&cluster, self.kind) {
            sync::sync::<ConfigMap>(ctx, cm, &DiffOpts::default()).await?;
            let live: Option<ConfigMap> =
                sync::get(ctx, &ctx.namespace, self.kind.name()).await?;
            cm_revision = live.and_then(|cm| cm.metadata.resource_version);
        }

        sync::sync::<Deployment>(
            ctx,
            registry::deployment(&cluster, self.kind, cm_revision.as_deref()),
            &DiffOpts::default(),
        )
        .await?;

        Ok(PhaseResult::done())
    }

    async fn finalize(&self, _ctx: &mut DeployContext) -> bool {
        true
    }
}