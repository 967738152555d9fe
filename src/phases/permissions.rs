//! Workspace permission management.
//!
//! The narrow strategy confines workspaces to the CheCluster namespace and
//! only needs namespaced Roles. The broad strategy lets the server create
//! workspace objects in arbitrary namespaces and needs ClusterRoles; before
//! delegating those the operator probes each rule with a
//! SelfSubjectAccessReview, because Kubernetes refuses to grant permissions
//! the grantor does not hold. A denied probe falls back to narrow and pins
//! `workspaceNamespaceDefault` to the CR namespace so the fallback is
//! visible on the CR.

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding};
use kube::api::PostParams;
use kube::Api;
use tracing::{info, warn};

use crate::controller::context::DeployContext;
use crate::controller::error::Result;
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::controller::status;
use crate::resources::rbac;
use crate::sync;
use crate::sync::DiffOpts;

pub struct PermissionsPhase;

#[async_trait]
impl Reconcilable for PermissionsPhase {
    fn name(&self) -> &'static str {
        "permissions"
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        reconcile_narrow(ctx).await?;

        if ctx.che_cluster.workspaces_in_other_namespaces() {
            let rules = [
                rbac::workspace_cluster_role_rules(),
                rbac::namespace_editor_rules(),
            ]
            .concat();
            if probe_rules(ctx, &rules).await? {
                reconcile_broad(ctx).await?;
            } else {
                warn!(
                    namespace = %ctx.namespace,
                    "Operator lacks permissions to delegate cluster-wide workspace access, \
                     falling back to single-namespace workspaces"
                );
                let ns = ctx.namespace.clone();
                status::update_spec(ctx, "server.workspaceNamespaceDefault", move |cr| {
                    cr.spec.server.workspace_namespace_default = Some(ns.clone());
                    cr.spec.server.allow_user_defined_workspace_namespaces = false;
                })
                .await?;
                cleanup_broad(ctx).await?;
            }
        } else {
            // Strategy switch back to narrow removes the broad grants
            cleanup_broad(ctx).await?;
        }

        Ok(PhaseResult::done())
    }

    async fn finalize(&self, ctx: &mut DeployContext) -> bool {
        cleanup_broad(ctx).await.is_ok()
    }
}

async fn reconcile_narrow(ctx: &DeployContext) -> Result<()> {
    let cluster = &ctx.che_cluster;
    sync::sync::<ServiceAccount>(
        ctx,
        rbac::workspace_service_account(cluster),
        &DiffOpts::default(),
    )
    .await?;
    sync::sync::<Role>(ctx, rbac::exec_role(cluster), &DiffOpts::default()).await?;
    sync::sync::<Role>(ctx, rbac::view_role(cluster), &DiffOpts::default()).await?;
    sync::sync::<RoleBinding>(
        ctx,
        rbac::workspace_role_binding(cluster, rbac::EXEC_ROLE),
        &DiffOpts::default(),
    )
    .await?;
    sync::sync::<RoleBinding>(
        ctx,
        rbac::workspace_role_binding(cluster, rbac::VIEW_ROLE),
        &DiffOpts::default(),
    )
    .await?;
    sync::sync::<RoleBinding>(
        ctx,
        rbac::che_edit_role_binding(cluster),
        &DiffOpts::default(),
    )
    .await?;
    Ok(())
}

async fn reconcile_broad(ctx: &DeployContext) -> Result<()> {
    let cluster = &ctx.che_cluster;
    let ns = &ctx.namespace;
    sync::sync_cluster_scoped::<ClusterRole>(
        ctx,
        rbac::workspace_cluster_role(cluster, ns),
        &DiffOpts::default(),
    )
    .await?;
    sync::sync_cluster_scoped::<ClusterRoleBinding>(
        ctx,
        rbac::cluster_role_binding(cluster, &rbac::workspace_cluster_role_name(ns)),
        &DiffOpts::default(),
    )
    .await?;
    sync::sync_cluster_scoped::<ClusterRole>(
        ctx,
        rbac::namespace_editor_cluster_role(cluster, ns),
        &DiffOpts::default(),
    )
    .await?;
    sync::sync_cluster_scoped::<ClusterRoleBinding>(
        ctx,
        rbac::cluster_role_binding(cluster, &rbac::namespace_editor_cluster_role_name(ns)),
        &DiffOpts::default(),
    )
    .await?;
    info!(namespace = %ns, "Cluster-wide workspace permissions in place");
    Ok(())
}

async fn cleanup_broad(ctx: &DeployContext) -> Result<()> {
    let ns = &ctx.namespace;
    for name in [
        rbac::workspace_cluster_role_name(ns),
        rbac::namespace_editor_cluster_role_name(ns),
    ] {
        sync::delete_cluster_scoped::<ClusterRoleBinding>(ctx, &name).await?;
        sync::delete_cluster_scoped::<ClusterRole>(ctx, &name).await?;
    }
    Ok(())
}

/// Ask the API server whether the operator itself holds every verb of every
/// rule it is about to delegate.
async fn probe_rules(ctx: &DeployContext, rules: &[PolicyRule]) -> Result<bool> {
    let api: Api<SelfSubjectAccessReview> = Api::all(ctx.client.clone());
    for rule in rules {
        let groups = rule.api_groups.clone().unwrap_or_default();
        let resources = rule.resources.clone().unwrap_or_default();
        for group in &groups {
            for resource in &resources {
                for verb in &rule.verbs {
                    let review = SelfSubjectAccessReview {
                        spec: SelfSubjectAccessReviewSpec {
                            resource_attributes: Some(ResourceAttributes {
                                group: Some(group.clone()),
                                resource: Some(resource.clone()),
                                verb: Some(verb.clone()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        ..Default::default()
                    };
                    let answer = api.create(&PostParams::default(), &review).await?;
                    let allowed = answer.status.as_ref().is_some_and(|s| s.allowed);
                    if !allowed {
                        warn!(
                            group = %group,
                            resource = %resource,
                            verb = %verb,
                            "Access review denied"
                        );
                        return Ok(false);
                    }
                }
            }
        }
    }
    Ok(true)
}
