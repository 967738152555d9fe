//! TLS bootstrap on plain Kubernetes.
//!
//! `che-tls` (serving pair) and `self-signed-certificate` (CA) are only
//! trusted together: the CA must be the one that signed the serving pair,
//! so whenever either half is missing or malformed both are deleted and
//! regenerated by one run of the bootstrap job.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use tracing::{info, warn};

use crate::controller::context::DeployContext;
use crate::controller::error::Result;
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::resources::rbac;
use crate::resources::tls;
use crate::sync;
use crate::sync::DiffOpts;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct TlsPhase;

#[async_trait]
impl Reconcilable for TlsPhase {
    fn name(&self) -> &'static str {
        "tls"
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        // OpenShift terminates TLS at the router; nothing to bootstrap
        if ctx.is_openshift || !ctx.tls_enabled() {
            return Ok(PhaseResult::done());
        }
        // An administrator-supplied secret is used as-is by the ingresses
        if ctx
            .che_cluster
            .spec
            .k8s
            .tls_secret_name
            .as_deref()
            .is_some_and(|s| !s.is_empty())
        {
            return Ok(PhaseResult::done());
        }

        let serving: Option<Secret> =
            sync::get(ctx, &ctx.namespace, tls::CHE_TLS_SECRET).await?;
        let ca: Option<Secret> =
            sync::get(ctx, &ctx.namespace, tls::SELF_SIGNED_CERT_SECRET).await?;

        let serving_ok = serving.as_ref().is_some_and(tls::is_valid_tls_secret);
        let ca_ok = ca.as_ref().is_some_and(tls::is_valid_ca_secret);

        if serving_ok && ca_ok {
            // Leftover job from the run that produced the pair
            sync::delete::<Job>(ctx, &ctx.namespace, tls::TLS_JOB_NAME).await?;
            return Ok(PhaseResult::done());
        }

        // Pair invariant: regenerate both halves together
        if serving.is_some() {
            warn!(secret = tls::CHE_TLS_SECRET, valid = serving_ok, "Dropping TLS secret half");
            sync::delete::<Secret>(ctx, &ctx.namespace, tls::CHE_TLS_SECRET).await?;
        }
        if ca.is_some() {
            warn!(secret = tls::SELF_SIGNED_CERT_SECRET, valid = ca_ok, "Dropping TLS secret half");
            sync::delete::<Secret>(ctx, &ctx.namespace, tls::SELF_SIGNED_CERT_SECRET).await?;
        }

        ensure_job_rbac(ctx).await?;

        let job: Option<Job> = sync::get(ctx, &ctx.namespace, tls::TLS_JOB_NAME).await?;
        match job {
            None => {
                info!(job = tls::TLS_JOB_NAME, "Launching TLS bootstrap job");
                sync::create(ctx, tls::tls_job(&ctx.che_cluster)).await?;
            }
            Some(job) if tls::job_succeeded(&job) => {
                // Secrets are re-checked on the next tick
                sync::delete::<Job>(ctx, &ctx.namespace, tls::TLS_JOB_NAME).await?;
            }
            Some(job) if job_failed(&job) => {
                warn!(job = tls::TLS_JOB_NAME, "TLS bootstrap job failed, retrying");
                sync::delete::<Job>(ctx, &ctx.namespace, tls::TLS_JOB_NAME).await?;
            }
            Some(_) => {}
        }
        Ok(PhaseResult::requeue(POLL_INTERVAL))
    }

    async fn finalize(&self, _ctx: &mut DeployContext) -> bool {
        // Everything here is namespaced and owned by the CR
        true
    }
}

async fn ensure_job_rbac(ctx: &DeployContext) -> Result<()> {
    let cluster = &ctx.che_cluster;
    sync::sync::<ServiceAccount>(ctx, rbac::tls_job_service_account(cluster), &DiffOpts::default())
        .await?;
    sync::sync::<Role>(ctx, rbac::tls_job_role(cluster), &DiffOpts::default()).await?;
    sync::sync::<RoleBinding>(ctx, rbac::tls_job_role_binding(cluster), &DiffOpts::default())
        .await?;
    Ok(())
}

// Failed pods under the backoff limit are retried by the job controller
// itself; the job is only torn down and relaunched once it has given up.
fn job_failed(job: &Job) -> bool {
    let backoff = job
        .spec
        .as_ref()
        .and_then(|s| s.backoff_limit)
        .unwrap_or(6);
    job.status.as_ref().and_then(|s| s.failed).unwrap_or(0) > backoff
}
