//! Reconciliation entry point for CheCluster resources.
//!
//! One tick runs the whole phase pipeline; phases yield by returning a
//! requeue hint instead of blocking, so a tick is always short-lived.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::DeployContext;
use crate::controller::error::{Error, Result};
use crate::controller::pipeline::ReconcileManager;
use crate::controller::validation::{self, INGRESS_DOMAIN_HELP};
use crate::controller::status;
use crate::crd::CheCluster;
use crate::phases::build_pipeline;
use crate::resources::common::{ALL_FINALIZERS, FIELD_MANAGER};

/// Requeue spacing once the whole pipeline has converged
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Requeue spacing while finalization is incomplete
const FINALIZE_RETRY: Duration = Duration::from_secs(5);

/// State shared by every reconciliation
pub struct Context {
    pub client: Client,
    pipeline: ReconcileManager,
}

impl Context {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pipeline: build_pipeline(),
        }
    }
}

#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<CheCluster>, ctx: Arc<Context>) -> Result<Action> {
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    info!("Reconciling CheCluster");

    // Deletion runs before the singleton check so a stray duplicate can
    // always be finalized and removed
    if cluster.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&cluster, &ctx, &ns).await;
    }

    // Only one CheCluster per namespace is served; the oldest wins so that
    // a stray duplicate cannot steal the deployment. The duplicate carries
    // the failure on its own status.
    if let Err(e) = check_singleton(&cluster, &ctx, &ns).await {
        report_duplicate(&ctx, &ns, &name, &e).await?;
        return Err(e);
    }

    if ensure_finalizers(&cluster, &ctx, &ns).await? {
        // Pick up the patched object before doing real work
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut deploy = DeployContext::new(ctx.client.clone(), (*cluster).clone()).await?;

    if let Err(e) = validation::validate(&deploy.che_cluster, deploy.is_openshift) {
        let message = e.to_string();
        let help = message
            .contains("ingressDomain")
            .then_some(INGRESS_DOMAIN_HELP);
        status::set_failure(&mut deploy, "InvalidCheClusterSpec", &message, help).await?;
        return Err(e);
    }

    match ctx.pipeline.reconcile_all(&mut deploy).await {
        Ok(result) => {
            status::clear_failure(&mut deploy).await?;
            if let Some(delay) = result.requeue_after {
                Ok(Action::requeue(delay))
            } else if result.done {
                debug!(name = %name, "Pipeline converged");
                Ok(Action::requeue(RESYNC_INTERVAL))
            } else {
                // Blocked without a timer; the next CR or owned-object edit
                // re-triggers the tick
                Ok(Action::await_change())
            }
        }
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
            let _ = status::set_failure(&mut deploy, "ReconciliationFailed", &e.to_string(), None)
                .await;
            Err(e)
        }
    }
}

/// Error policy: retryable errors come back quickly, the rest wait for a
/// spec edit (with a slow safety-net requeue)
pub fn error_policy(cluster: Arc<CheCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, requeuing");
        Action::requeue(Duration::from_secs(5))
    } else {
        error!(name = %name, error = %error, "Non-retryable error, waiting for a spec change");
        Action::requeue(Duration::from_secs(5 * 60))
    }
}

async fn check_singleton(cluster: &CheCluster, ctx: &Context, ns: &str) -> Result<()> {
    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), ns);
    let peers = api.list(&ListParams::default()).await?.items;
    if peers.len() <= 1 {
        return Ok(());
    }
    let oldest = peers
        .iter()
        .min_by_key(|c| {
            (
                c.metadata.creation_timestamp.clone(),
                c.metadata.name.clone(),
            )
        })
        .and_then(|c| c.metadata.name.clone());
    if oldest.as_deref() == Some(cluster.name_any().as_str()) {
        return Ok(());
    }
    Err(Error::NonSingletonError {
        namespace: ns.to_string(),
        found: peers.len(),
    })
}

/// Write the singleton violation onto the duplicate CR's status so the
/// configuration error is visible without reading operator logs.
async fn report_duplicate(ctx: &Context, ns: &str, name: &str, error: &Error) -> Result<()> {
    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), ns);
    let patch = serde_json::json!({
        "status": {
            "reason": "MultipleCheClusters",
            "message": error.to_string(),
        }
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Add any missing finalizers. Returns whether a patch was written.
async fn ensure_finalizers(cluster: &CheCluster, ctx: &Context, ns: &str) -> Result<bool> {
    let mut finalizers = cluster.metadata.finalizers.clone().unwrap_or_default();
    let before = finalizers.len();
    for f in ALL_FINALIZERS {
        if !finalizers.iter().any(|existing| existing == f) {
            finalizers.push((*f).to_string());
        }
    }
    if finalizers.len() == before {
        return Ok(false);
    }
    debug!(added = finalizers.len() - before, "Adding finalizers");
    patch_finalizers(ctx, ns, &cluster.name_any(), finalizers).await?;
    Ok(true)
}

async fn handle_deletion(cluster: &CheCluster, ctx: &Context, ns: &str) -> Result<Action> {
    let ours: Vec<String> = cluster
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| ALL_FINALIZERS.contains(&f.as_str()))
        .collect();
    if ours.is_empty() {
        debug!("No finalizers left, nothing to clean up");
        return Ok(Action::await_change());
    }

    info!("CheCluster deleted, finalizing");
    let mut deploy = DeployContext::new(ctx.client.clone(), cluster.clone()).await?;
    if !ctx.pipeline.finalize_all(&mut deploy).await {
        return Ok(Action::requeue(FINALIZE_RETRY));
    }

    let remaining: Vec<String> = cluster
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| !ALL_FINALIZERS.contains(&f.as_str()))
        .collect();
    patch_finalizers(ctx, ns, &cluster.name_any(), remaining).await?;
    info!("Finalization complete, released the object");
    Ok(Action::await_change())
}

/// Merge patches replace the whole array, so the full desired list is sent
async fn patch_finalizers(
    ctx: &Context,
    ns: &str,
    name: &str,
    finalizers: Vec<String>,
) -> Result<()> {
    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), ns);
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
