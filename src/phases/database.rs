//! Embedded PostgreSQL deployment and one-shot provisioning.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use tracing::{debug, info};

use crate::controller::context::DeployContext;
use crate::controller::error::{Error, Result};
use crate::controller::pipeline::{PhaseResult, Reconcilable};
use crate::controller::status;
use crate::crd::CheCluster;
use crate::resources::keycloak::{
    self, IDENTITY_POSTGRES_SECRET, KEYCLOAK_DB, KEYCLOAK_DB_USER,
};
use crate::resources::postgres;
use crate::sync;
use crate::sync::DiffOpts;
use crate::util::exec::{exec_in_pod, find_component_pod};
use crate::util::password::generate_password;

const WAIT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_POSTGRES_USER: &str = "pgche";

pub struct DatabasePhase;

#[async_trait]
impl Reconcilable for DatabasePhase {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn reconcile(&self, ctx: &mut DeployContext) -> Result<PhaseResult> {
        if ctx.che_cluster.spec.database.external_db {
            debug!("External database configured, skipping embedded PostgreSQL");
            return Ok(PhaseResult::done());
        }

        let secret_name = ensure_credentials(ctx).await?;
        ensure_identity_db_secret(ctx).await?;

        let cluster = &ctx.che_cluster;
        sync::sync::<PersistentVolumeClaim>(ctx, postgres::data_pvc(cluster), &DiffOpts::default())
            .await?;
        sync::sync::<Service>(ctx, postgres::service(cluster), &DiffOpts::default()).await?;
        sync::sync::<Deployment>(
            ctx,
            postgres::deployment(cluster, secret_name.as_deref()),
            &DiffOpts::default(),
        )
        .await?;

        let live: Option<Deployment> =
            sync::get(ctx, &ctx.namespace, postgres::POSTGRES_NAME).await?;
        let ready = live.as_ref().is_some_and(postgres::deployment_ready);
        if !ready {
            debug!("PostgreSQL deployment not ready yet");
            return Ok(PhaseResult::requeue(WAIT_INTERVAL));
        }

        let provisioned = ctx
            .che_cluster
            .status
            .as_ref()
            .is_some_and(|s| s.db_provisoned);
        let version = postgres::version(&ctx.che_cluster);
        if !provisioned {
            provision_identity_database(ctx).await?;
            let v = version.clone();
            status::update_status(ctx, move |s| {
                s.db_provisoned = true;
                s.postgres_version = v.clone();
            })
            .await?;
        } else if ctx.che_cluster.status.as_ref().and_then(|s| s.postgres_version.clone())
            != version
        {
            // Image swap after provisioning still refreshes the version
            let v = version.clone();
            status::update_status(ctx, move |s| s.postgres_version = v.clone()).await?;
        }

        Ok(PhaseResult::done())
    }

    async fn finalize(&self, _ctx: &mut DeployContext) -> bool {
        true
    }
}

/// Name of the secret holding database credentials, if credentials live in
/// a secret at all. `None` means the plain CR fields are used.
pub fn credentials_secret_name(cluster: &CheCluster) -> Option<String> {
    let db = &cluster.spec.database;
    if let Some(secret) = db.che_postgres_secret.as_ref().filter(|s| !s.is_empty()) {
        return Some(secret.clone());
    }
    let user_set = db.che_postgres_user.as_deref().is_some_and(|u| !u.is_empty());
    let password_set = db
        .che_postgres_password
        .as_deref()
        .is_some_and(|p| !p.is_empty());
    if user_set && password_set {
        return None;
    }
    Some(postgres::POSTGRES_SECRET.to_string())
}

/// Resolve the credentials secret; when credentials need generating, the
/// secret is created exactly once and read back on every later tick so the
/// password never changes behind the database's back.
async fn ensure_credentials(ctx: &mut DeployContext) -> Result<Option<String>> {
    let Some(name) = credentials_secret_name(&ctx.che_cluster) else {
        return Ok(None);
    };
    // Administrator-supplied secrets are taken as-is
    if ctx.che_cluster.spec.database.che_postgres_secret.as_deref() == Some(name.as_str()) {
        return Ok(Some(name));
    }

    let existing: Option<Secret> = sync::get(ctx, &ctx.namespace, &name).await?;
    if existing.is_none() {
        let user = ctx
            .che_cluster
            .spec
            .database
            .che_postgres_user
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_POSTGRES_USER.to_string());
        let password = generate_password(12);
        info!(secret = %name, "Generating database credentials");
        sync::create_if_not_exists(
            ctx,
            postgres::credentials_secret(&ctx.che_cluster, &user, &password),
        )
        .await?;
        let secret_ref = name.clone();
        status::update_status(ctx, move |s| {
            s.credentials_secret_ref = Some(secret_ref.clone());
        })
        .await?;
    }
    Ok(Some(name))
}

/// The identity provider's database password is needed both here (to create
/// the role) and by the Keycloak deployment; generated once, read back after.
async fn ensure_identity_db_secret(ctx: &DeployContext) -> Result<()> {
    let existing: Option<Secret> =
        sync::get(ctx, &ctx.namespace, IDENTITY_POSTGRES_SECRET).await?;
    if existing.is_none() {
        info!(secret = IDENTITY_POSTGRES_SECRET, "Generating identity provider database password");
        sync::create_if_not_exists(
            ctx,
            keycloak::identity_postgres_secret(&ctx.che_cluster, &generate_password(12)),
        )
        .await?;
    }
    Ok(())
}

async fn read_secret_key(ctx: &DeployContext, name: &str, key: &str) -> Result<String> {
    let secret: Option<Secret> = sync::get(ctx, &ctx.namespace, name).await?;
    let secret = secret.ok_or(Error::MissingObjectKey("secret"))?;
    let data = secret.data.as_ref().ok_or(Error::MissingObjectKey("data"))?;
    let bytes = data.get(key).ok_or(Error::MissingObjectKey("password"))?;
    String::from_utf8(bytes.0.clone())
        .map_err(|_| Error::ValidationError(format!("secret {name} key {key} is not UTF-8")))
}

/// Create the identity provider's database, role and grants inside the
/// PostgreSQL pod. Idempotence comes from the `status.dbProvisoned` gate,
/// not from the SQL.
async fn provision_identity_database(ctx: &DeployContext) -> Result<()> {
    let password = read_secret_key(ctx, IDENTITY_POSTGRES_SECRET, "password").await?;
    let selector = format!(
        "app={},component={}",
        ctx.flavor(),
        postgres::POSTGRES_NAME
    );
    let Some(pod) = find_component_pod(&ctx.client, &ctx.namespace, &selector).await? else {
        return Err(Error::ExecError {
            pod: postgres::POSTGRES_NAME.to_string(),
            message: "no running PostgreSQL pod found".to_string(),
        });
    };

    let sql = format!(
        "psql -c \"CREATE USER {KEYCLOAK_DB_USER} WITH PASSWORD '{password}'\" && \
         psql -c \"CREATE DATABASE {KEYCLOAK_DB}\" && \
         psql -c \"GRANT ALL PRIVILEGES ON DATABASE {KEYCLOAK_DB} TO {KEYCLOAK_DB_USER}\" && \
         psql -c \"ALTER USER {KEYCLOAK_DB_USER} WITH SUPERUSER\""
    );
    info!(pod = %pod, "Provisioning identity provider database");
    exec_in_pod(
        &ctx.client,
        &ctx.namespace,
        &pod,
        postgres::POSTGRES_NAME,
        &sql,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::CheClusterSpec;

    fn cluster() -> CheCluster {
        CheCluster::new("eclipse-che", CheClusterSpec::default())
    }

    #[test]
    fn explicit_secret_wins() {
        let mut c = cluster();
        c.spec.database.che_postgres_secret = Some("custom-secret".to_string());
        assert_eq!(
            credentials_secret_name(&c).as_deref(),
            Some("custom-secret")
        );
    }

    #[test]
    fn plain_credentials_use_no_secret() {
        let mut c = cluster();
        c.spec.database.che_postgres_user = Some("pgche".to_string());
        c.spec.database.che_postgres_password = Some("s3cret".to_string());
        assert_eq!(credentials_secret_name(&c), None);
    }

    #[test]
    fn missing_credentials_mean_generated_secret() {
        assert_eq!(
            credentials_secret_name(&cluster()).as_deref(),
            Some(postgres::POSTGRES_SECRET)
        );
    }
}
