//! CR status and spec writes with conflict retry.
//!
//! Writes re-read the CheCluster and retry in a bounded loop on
//! optimistic-concurrency conflicts; after the loop the error propagates
//! and the manager retries the whole tick.

use std::time::Duration;

use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, ResourceExt};
use tracing::{debug, info};

use crate::controller::context::DeployContext;
use crate::controller::error::{is_kube_conflict, Error, Result};
use crate::crd::{CheCluster, CheClusterStatus, ChePhase};
use crate::resources::common::FIELD_MANAGER;

/// Status-conflict retries before giving the tick back to the manager
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Spacing between conflict retries
const CONFLICT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Apply a mutation to the CR status, conflict-retried. The context's CR
/// handle is refreshed with the accepted object.
pub async fn update_status<F>(ctx: &mut DeployContext, mutate: F) -> Result<()>
where
    F: Fn(&mut CheClusterStatus),
{
    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let name = ctx.che_cluster.name_any();

    for attempt in 0..MAX_CONFLICT_RETRIES {
        let latest = api.get(&name).await?;
        let mut status = latest.status.clone().unwrap_or_default();
        mutate(&mut status);

        let patch = serde_json::json!({ "status": status });
        match api
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(updated) => {
                ctx.che_cluster = updated;
                return Ok(());
            }
            Err(e) if is_kube_conflict(&e) => {
                debug!(attempt, "Status update conflicted, retrying");
                tokio::time::sleep(CONFLICT_RETRY_DELAY).await;
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
    Err(Error::StatusConflictError(name))
}

/// Apply a mutation to the CR spec, conflict-retried. Used sparingly: the
/// controller only rewrites spec fields it owns the default of (workspace
/// namespace fallback, generated host). Every changed field is logged.
pub async fn update_spec<F>(ctx: &mut DeployContext, field: &str, mutate: F) -> Result<()>
where
    F: Fn(&mut CheCluster),
{
    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let name = ctx.che_cluster.name_any();

    for attempt in 0..MAX_CONFLICT_RETRIES {
        let mut latest = api.get(&name).await?;
        mutate(&mut latest);

        match api.replace(&name, &PostParams::default(), &latest).await {
            Ok(updated) => {
                info!(field, "Updated CheCluster spec field");
                ctx.che_cluster = updated;
                return Ok(());
            }
            Err(e) if is_kube_conflict(&e) => {
                debug!(attempt, field, "Spec update conflicted, retrying");
                tokio::time::sleep(CONFLICT_RETRY_DELAY).await;
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
    Err(Error::StatusConflictError(name))
}

/// Transition the running phase, skipping no-op writes
pub async fn set_phase(ctx: &mut DeployContext, phase: ChePhase) -> Result<()> {
    let current = ctx
        .che_cluster
        .status
        .as_ref()
        .and_then(|s| s.che_cluster_running.clone());
    if current.as_ref() == Some(&phase) {
        return Ok(());
    }
    info!(phase = %phase, "CheCluster phase transition");
    update_status(ctx, |status| {
        status.che_cluster_running = Some(phase.clone());
    })
    .await
}

/// Surface a user-facing failure triplet on status
pub async fn set_failure(
    ctx: &mut DeployContext,
    reason: &str,
    message: &str,
    help_link: Option<&str>,
) -> Result<()> {
    let reason = reason.to_string();
    let message = message.to_string();
    let help_link = help_link.map(|s| s.to_string());
    update_status(ctx, |status| {
        status.reason = Some(reason.clone());
        status.message = Some(message.clone());
        status.help_link = help_link.clone();
    })
    .await
}

/// Clear a previously surfaced failure. Fields skipped by the serializer
/// cannot be cleared through a struct merge, so the nulls are sent
/// explicitly.
pub async fn clear_failure(ctx: &mut DeployContext) -> Result<()> {
    let dirty = ctx
        .che_cluster
        .status
        .as_ref()
        .is_some_and(|s| s.reason.is_some() || s.message.is_some());
    if !dirty {
        return Ok(());
    }
    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let name = ctx.che_cluster.name_any();
    let patch = serde_json::json!({
        "status": { "reason": null, "message": null, "helpLink": null }
    });
    let updated = api
        .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    ctx.che_cluster = updated;
    Ok(())
}
