//! CRD installation helpers for integration tests

use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::{Api, Client, CustomResourceExt};
use thiserror::Error;

use che_operator::crd::CheCluster;

const CRD_NAME: &str = "checlusters.org.eclipse.che";

#[derive(Error, Debug)]
pub enum CrdError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("CRD establishment timeout")]
    EstablishmentTimeout,

    #[error("Wait error: {0}")]
    WaitError(#[from] kube::runtime::wait::Error),
}

/// Install the CheCluster CRD generated from the Rust types
pub async fn install_crd(client: Client) -> Result<(), CrdError> {
    let crd = CheCluster::crd();

    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let params = PatchParams::apply("integration-test").force();

    tracing::info!("Installing CheCluster CRD...");
    crds.patch(CRD_NAME, &params, &Patch::Apply(&crd)).await?;

    let establish = await_condition(crds, CRD_NAME, conditions::is_crd_established());
    tokio::time::timeout(Duration::from_secs(30), establish)
        .await
        .map_err(|_| CrdError::EstablishmentTimeout)??;

    tracing::info!("CRD installed and established");
    Ok(())
}
