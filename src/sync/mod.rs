//! Object synchronizer: create/get/sync/delete of arbitrary typed cluster
//! objects with ownership, masked diffing and a per-kind recreate policy.
//!
//! All operations take the active reconcile context and translate API
//! absence into plain booleans: NotFound on get/delete is not an error,
//! AlreadyExists is only swallowed by [`create_if_not_exists`].

pub mod diff;

use std::fmt::Debug;

use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, ClusterResourceScope, DynamicObject, NamespaceResourceScope, TypeMeta};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::controller::context::DeployContext;
use crate::controller::error::{is_kube_conflict, is_kube_not_found, Error, Result};
use crate::resources::common::{owner_reference, FIELD_MANAGER};
pub use diff::{requires_recreate, DiffOpts};

fn namespaced_api<K>(ctx: &DeployContext, blueprint_ns: Option<String>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let ns = blueprint_ns.unwrap_or_else(|| ctx.namespace.clone());
    Api::namespaced(ctx.client.clone(), &ns)
}

/// Ensure the live object equals the blueprint under the supplied diff
/// options. Creates when absent; on a non-empty diff, recreate kinds are
/// deleted and recreated, all others updated in place with the live
/// resourceVersion carried over. Returns `true` iff no mutation was needed.
pub async fn sync<K>(ctx: &DeployContext, mut blueprint: K, opts: &DiffOpts) -> Result<bool>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug,
{
    stamp_owner(ctx, &mut blueprint);
    let kind = K::kind(&()).to_string();
    let name = blueprint.name_any();
    let api: Api<K> = namespaced_api(ctx, blueprint.namespace());

    let Some(live) = api.get_opt(&name).await? else {
        info!(kind = %kind, name = %name, "Creating object");
        api.create(&PostParams::default(), &blueprint).await?;
        return Ok(false);
    };

    // Missing ownership is repaired on the next reconcile
    if !has_controller_ref(&live, ctx) {
        debug!(kind = %kind, name = %name, "Repairing missing owner reference");
        let patch = serde_json::json!({
            "metadata": { "ownerReferences": [owner_reference(&ctx.che_cluster)] }
        });
        api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
    }

    let changes = diff::diff_objects(&blueprint, &live, opts)?;
    if changes.is_empty() {
        return Ok(true);
    }
    // Default-option diffs are too noisy to log
    if !opts.masks.is_empty() {
        info!(kind = %kind, name = %name, changed = ?changes, "Object differs from blueprint");
    }

    if requires_recreate(&kind) {
        info!(kind = %kind, name = %name, "Recreating object");
        delete_ignore_not_found(&api, &name).await?;
        api.create(&PostParams::default(), &blueprint).await?;
    } else {
        info!(kind = %kind, name = %name, "Updating object");
        blueprint.meta_mut().resource_version = live.resource_version();
        api.replace(&name, &PostParams::default(), &blueprint).await?;
    }
    Ok(false)
}

/// Same as [`sync`] for cluster-scoped kinds. No owner reference is stamped;
/// cluster-scoped objects are cleaned up explicitly via finalizers.
pub async fn sync_cluster_scoped<K>(ctx: &DeployContext, mut blueprint: K, opts: &DiffOpts) -> Result<bool>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug,
{
    let kind = K::kind(&()).to_string();
    let name = blueprint.name_any();
    let api: Api<K> = Api::all(ctx.client.clone());

    let Some(live) = api.get_opt(&name).await? else {
        info!(kind = %kind, name = %name, "Creating cluster-scoped object");
        api.create(&PostParams::default(), &blueprint).await?;
        return Ok(false);
    };

    let changes = diff::diff_objects(&blueprint, &live, opts)?;
    if changes.is_empty() {
        return Ok(true);
    }
    if !opts.masks.is_empty() {
        info!(kind = %kind, name = %name, changed = ?changes, "Object differs from blueprint");
    }

    if requires_recreate(&kind) {
        delete_ignore_not_found(&api, &name).await?;
        api.create(&PostParams::default(), &blueprint).await?;
    } else {
        blueprint.meta_mut().resource_version = live.resource_version();
        api.replace(&name, &PostParams::default(), &blueprint).await?;
    }
    Ok(false)
}

/// Create only; AlreadyExists is an error
pub async fn create<K>(ctx: &DeployContext, mut blueprint: K) -> Result<bool>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug,
{
    stamp_owner(ctx, &mut blueprint);
    let api: Api<K> = namespaced_api(ctx, blueprint.namespace());
    api.create(&PostParams::default(), &blueprint).await?;
    Ok(true)
}

/// Create; AlreadyExists is success. The live object is NOT reconciled to
/// the blueprint.
pub async fn create_if_not_exists<K>(ctx: &DeployContext, mut blueprint: K) -> Result<bool>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug,
{
    stamp_owner(ctx, &mut blueprint);
    let api: Api<K> = namespaced_api(ctx, blueprint.namespace());
    match api.create(&PostParams::default(), &blueprint).await {
        Ok(_) => Ok(true),
        Err(e) if is_kube_conflict(&e) => {
            debug!(kind = %K::kind(&()), name = %blueprint.name_any(), "Object already exists");
            Ok(true)
        }
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// Fetch a namespaced object; NotFound maps to `Ok(None)`
pub async fn get<K>(ctx: &DeployContext, namespace: &str, name: &str) -> Result<Option<K>>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<K> = Api::namespaced(ctx.client.clone(), namespace);
    Ok(api.get_opt(name).await?)
}

/// Fetch a cluster-scoped object; NotFound maps to `Ok(None)`
pub async fn get_cluster_scoped<K>(ctx: &DeployContext, name: &str) -> Result<Option<K>>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<K> = Api::all(ctx.client.clone());
    Ok(api.get_opt(name).await?)
}

/// Delete a namespaced object if present; NotFound counts as done
pub async fn delete<K>(ctx: &DeployContext, namespace: &str, name: &str) -> Result<bool>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<K> = Api::namespaced(ctx.client.clone(), namespace);
    delete_ignore_not_found(&api, name).await?;
    Ok(true)
}

/// Delete a cluster-scoped object if present; NotFound counts as done
pub async fn delete_cluster_scoped<K>(ctx: &DeployContext, name: &str) -> Result<bool>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<K> = Api::all(ctx.client.clone());
    delete_ignore_not_found(&api, name).await?;
    Ok(true)
}

async fn delete_ignore_not_found<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if is_kube_not_found(&e) => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// List objects of a kind, re-stamping each item's kind/apiVersion from the
/// given ApiResource (the client strips TypeMeta from list items)
pub async fn list(
    ctx: &DeployContext,
    ar: &ApiResource,
    namespace: &str,
    lp: &ListParams,
) -> Result<Vec<DynamicObject>> {
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, ar);
    let mut items = api.list(lp).await?.items;
    restamp_items(&mut items, ar);
    Ok(items)
}

/// Restore kind/apiVersion on listed items
pub fn restamp_items(items: &mut [DynamicObject], ar: &ApiResource) {
    for item in items {
        item.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
    }
}

fn stamp_owner<K>(ctx: &DeployContext, blueprint: &mut K)
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    let meta = blueprint.meta_mut();
    if meta
        .owner_references
        .as_ref()
        .is_none_or(|refs| refs.is_empty())
    {
        meta.owner_references = Some(vec![owner_reference(&ctx.che_cluster)]);
    }
}

fn has_controller_ref<K>(live: &K, ctx: &DeployContext) -> bool
where
    K: Resource,
{
    let cr_uid = ctx.che_cluster.metadata.uid.clone().unwrap_or_default();
    live.meta().owner_references.as_ref().is_some_and(|refs| {
        refs.iter()
            .any(|r| r.controller.is_some_and(|c| c) && r.uid == cr_uid)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_items_get_their_type_meta_back() {
        let ar = ApiResource {
            group: "route.openshift.io".to_string(),
            version: "v1".to_string(),
            api_version: "route.openshift.io/v1".to_string(),
            kind: "Route".to_string(),
            plural: "routes".to_string(),
        };
        let mut items = vec![DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({}),
        }];
        restamp_items(&mut items, &ar);
        let types = items[0].types.as_ref().unwrap();
        assert_eq!(types.kind, "Route");
        assert_eq!(types.api_version, "route.openshift.io/v1");
    }
}
