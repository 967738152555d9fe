//! Phase reconcilers, one per slice of the platform.

pub mod database;
pub mod identity_provider;
pub mod oauth;
pub mod permissions;
pub mod registry;
pub mod server;
pub mod tls;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::Ingress;

use crate::controller::context::DeployContext;
use crate::controller::error::Result;
use crate::controller::pipeline::ReconcileManager;
use crate::crd::openshift::Route;
use crate::resources::exposure::{self, ExposureBackend};
use crate::resources::registry::RegistryKind;
use crate::sync;
use crate::sync::DiffOpts;

/// Build the pipeline in its fixed order. Each phase only starts once every
/// phase before it has converged.
pub fn build_pipeline() -> ReconcileManager {
    let mut mgr = ReconcileManager::new();
    mgr.add(Box::new(permissions::PermissionsPhase));
    mgr.add(Box::new(tls::TlsPhase));
    mgr.add(Box::new(database::DatabasePhase));
    mgr.add(Box::new(identity_provider::IdentityProviderPhase));
    mgr.add(Box::new(oauth::OAuthPhase));
    mgr.add(Box::new(registry::RegistryPhase::new(RegistryKind::Devfile)));
    mgr.add(Box::new(registry::RegistryPhase::new(RegistryKind::Plugin)));
    mgr.add(Box::new(server::ServerPhase));
    mgr
}

/// Sync a component's exposure through the chosen backend and delete the
/// two alternatives. Returns the public host once known; `None` while an
/// OpenShift router has not assigned one yet.
pub(crate) async fn expose_component(
    ctx: &DeployContext,
    component: &str,
    service: &str,
    port: i32,
) -> Result<Option<String>> {
    let cluster = &ctx.che_cluster;
    let backend = ExposureBackend::select(
        ctx.is_openshift,
        &cluster.spec.server.server_exposure_strategy,
    );
    match backend {
        ExposureBackend::Route => {
            sync::delete::<Ingress>(ctx, &ctx.namespace, component).await?;
            sync::delete::<ConfigMap>(
                ctx,
                &ctx.namespace,
                &exposure::gateway_config_name(component),
            )
            .await?;
            // Empty ingress domain: leave the host empty, the router assigns
            let explicit_host = cluster
                .spec
                .k8s
                .ingress_domain
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|_| exposure::multi_host_hostname(cluster, component));
            let mut route = exposure::route(
                cluster,
                component,
                explicit_host.as_deref().unwrap_or_default(),
                service,
                port,
                ctx.tls_enabled() || ctx.is_openshift,
            );
            route.spec.host = explicit_host;
            sync::sync::<Route>(ctx, route, &DiffOpts::ignore(&["spec/host"])).await?;
            let live: Option<Route> = sync::get(ctx, &ctx.namespace, component).await?;
            Ok(live.and_then(|r| {
                r.spec.host.filter(|h| !h.is_empty()).or_else(|| {
                    r.status
                        .and_then(|s| s.ingress.into_iter().next())
                        .and_then(|i| i.host)
                })
            }))
        }
        ExposureBackend::Ingress => {
            if ctx.is_openshift {
                sync::delete::<Route>(ctx, &ctx.namespace, component).await?;
            }
            sync::delete::<ConfigMap>(
                ctx,
                &ctx.namespace,
                &exposure::gateway_config_name(component),
            )
            .await?;
            let host = exposure::multi_host_hostname(cluster, component);
            sync::sync::<Ingress>(
                ctx,
                exposure::ingress(cluster, component, &host, service, port, ctx.tls_enabled()),
                &DiffOpts::default(),
            )
            .await?;
            Ok(Some(host))
        }
        ExposureBackend::GatewayConfig => {
            sync::delete::<Ingress>(ctx, &ctx.namespace, component).await?;
            if ctx.is_openshift {
                sync::delete::<Route>(ctx, &ctx.namespace, component).await?;
            }
            sync::sync::<ConfigMap>(
                ctx,
                exposure::gateway_config_map(cluster, component, service, port),
                &DiffOpts::default(),
            )
            .await?;
            Ok(Some(ctx.che_host.clone()))
        }
    }
}
