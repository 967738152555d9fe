pub mod controller;
pub mod crd;
pub mod health;
pub mod phases;
pub mod resources;
pub mod sync;
pub mod util;

pub use controller::reconciler::{error_policy, reconcile, Context};
pub use controller::{DeployContext, Error, Result};
pub use crd::CheCluster;
pub use health::HealthState;

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the operator controller (cluster-wide).
///
/// Watches CheCluster resources and every kind the deployment phases own,
/// so an edit to any owned object re-triggers reconciliation.
pub async fn run_controller(client: Client, health_state: Option<Arc<HealthState>>) {
    run_controller_scoped(client, health_state, None).await
}

/// Run the operator controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only resources in that namespace are
/// watched. Scoping keeps parallel integration tests from interfering.
pub async fn run_controller_scoped(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!("Starting controller for CheCluster resources (scope: {scope_msg})");

    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone()));

    let clusters: Api<CheCluster> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);
    let ingresses: Api<Ingress> = scoped_api(client.clone(), namespace);
    let jobs: Api<Job> = scoped_api(client.clone(), namespace);
    let service_accounts: Api<ServiceAccount> = scoped_api(client.clone(), namespace);
    let roles: Api<Role> = scoped_api(client.clone(), namespace);
    let role_bindings: Api<RoleBinding> = scoped_api(client.clone(), namespace);
    let pvcs: Api<PersistentVolumeClaim> = scoped_api(client.clone(), namespace);

    // any_semantic keeps resource discovery reliable on fresh clusters
    let watcher_config = WatcherConfig::default().any_semantic();

    let mut controller = Controller::new(clusters, watcher_config.clone())
        .owns(deployments, watcher_config.clone())
        .owns(services, watcher_config.clone())
        .owns(configmaps, watcher_config.clone())
        .owns(secrets, watcher_config.clone())
        .owns(ingresses, watcher_config.clone())
        .owns(jobs, watcher_config.clone())
        .owns(service_accounts, watcher_config.clone())
        .owns(roles, watcher_config.clone())
        .owns(role_bindings, watcher_config.clone())
        .owns(pvcs, watcher_config.clone());

    // Routes only exist on OpenShift; watching them elsewhere fails discovery
    match controller::context::detect_openshift(&client).await {
        Ok(true) => {
            let routes: Api<crd::openshift::Route> = scoped_api(client.clone(), namespace);
            controller = controller.owns(routes, watcher_config);
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!("OpenShift detection failed, not watching Routes: {e}");
        }
    }

    controller
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // NotFound after deletion is expected when watch events
                    // arrive for an object that is already gone
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {e:?}");
                    } else {
                        tracing::error!("Reconciliation error: {e:?}");
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}
