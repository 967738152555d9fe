//! Fast integration tests for the CheCluster operator.
//!
//! The tests verify operator logic only: created objects, owner references,
//! finalizers and status writes. They never wait for pods to become ready,
//! which would require pulling the full Che image set.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::Role;
use kube::api::{DeleteParams, PostParams};
use kube::runtime::wait::await_condition;
use kube::{Api, Client, ResourceExt};

use che_operator::crd::CheCluster;
use che_operator::resources::common::OAUTH_CLIENT_FINALIZER;

use crate::common::test_cluster_with;
use crate::{has_credentials_secret, has_failure_reason, has_finalizer, is_gone};
use crate::{install_crd, ScopedOperator, TestNamespace};

/// Short timeout - we're testing operator logic, not pod readiness
const FAST_TIMEOUT: Duration = Duration::from_secs(30);

struct TestContext {
    client: Client,
    namespace: TestNamespace,
    _operator: ScopedOperator,
}

async fn setup(prefix: &str) -> TestContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,kube=warn")
        .with_test_writer()
        .try_init();

    // Provisioning scripts exec into pods; no pods run in these tests
    std::env::set_var("MOCK_API", "1");

    let client = Client::try_default().await.expect("kubeconfig available");
    install_crd(client.clone()).await.expect("CRD installed");
    let namespace = TestNamespace::create(client.clone(), prefix)
        .await
        .expect("test namespace created");
    let operator = ScopedOperator::start(client.clone(), namespace.name()).await;

    TestContext {
        client,
        namespace,
        _operator: operator,
    }
}

/// Default CheCluster for plain Kubernetes, renamed into the test namespace
fn che_cluster(ns: &str) -> CheCluster {
    let mut cluster = test_cluster_with(|spec| {
        spec.k8s.ingress_domain = Some("192.168.99.1.nip.io".to_string());
    });
    cluster.metadata.namespace = Some(ns.to_string());
    cluster.metadata.uid = None;
    cluster
}

async fn wait_for<C>(api: &Api<CheCluster>, name: &str, condition: C, what: &str) -> CheCluster
where
    C: kube::runtime::wait::Condition<CheCluster>,
{
    let waited = tokio::time::timeout(FAST_TIMEOUT, await_condition(api.clone(), name, condition))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("watch stream");
    waited.unwrap_or_else(|| panic!("CheCluster disappeared while waiting for {what}"))
}

#[tokio::test]
#[ignore]
async fn creates_core_objects_and_finalizers() {
    let ctx = setup("che-create").await;
    let ns = ctx.namespace.name().to_string();

    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ns);
    let cluster = che_cluster(&ns);
    let name = cluster.name_any();
    api.create(&PostParams::default(), &cluster)
        .await
        .expect("CheCluster created");

    wait_for(&api, &name, has_finalizer(OAUTH_CLIENT_FINALIZER), "finalizer").await;
    let with_secret = wait_for(
        &api,
        &name,
        has_credentials_secret(),
        "generated database credentials",
    )
    .await;
    assert_eq!(
        with_secret
            .status
            .unwrap()
            .credentials_secret_ref
            .as_deref(),
        Some("che-postgres-secret")
    );

    // Permissions phase output
    let sa: Api<ServiceAccount> = Api::namespaced(ctx.client.clone(), &ns);
    assert!(sa.get_opt("che-workspace").await.unwrap().is_some());
    let roles: Api<Role> = Api::namespaced(ctx.client.clone(), &ns);
    assert!(roles.get_opt("exec").await.unwrap().is_some());
    assert!(roles.get_opt("view").await.unwrap().is_some());

    // Database phase output, garbage-collectable through the owner ref
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &ns);
    assert!(secrets.get_opt("che-postgres-secret").await.unwrap().is_some());
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ns);
    let postgres = deployments
        .get_opt("postgres")
        .await
        .unwrap()
        .expect("postgres deployment");
    let owner = &postgres.metadata.owner_references.unwrap()[0];
    assert_eq!(owner.kind, "CheCluster");
    assert_eq!(owner.controller, Some(true));
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &ns);
    assert!(services.get_opt("postgres").await.unwrap().is_some());

    ctx.namespace.delete().await.expect("namespace deleted");
}

#[tokio::test]
#[ignore]
async fn rejects_kubernetes_cluster_without_ingress_domain() {
    let ctx = setup("che-invalid").await;
    let ns = ctx.namespace.name().to_string();

    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ns);
    let mut cluster = che_cluster(&ns);
    cluster.spec.k8s.ingress_domain = None;
    let name = cluster.name_any();
    api.create(&PostParams::default(), &cluster)
        .await
        .expect("CheCluster created");

    let failed = wait_for(
        &api,
        &name,
        has_failure_reason("InvalidCheClusterSpec"),
        "validation failure on status",
    )
    .await;
    let status = failed.status.unwrap();
    assert!(status.message.unwrap().contains("ingressDomain"));
    assert!(status.help_link.is_some());

    ctx.namespace.delete().await.expect("namespace deleted");
}

#[tokio::test]
#[ignore]
async fn deletion_runs_finalizers_and_releases_the_object() {
    let ctx = setup("che-delete").await;
    let ns = ctx.namespace.name().to_string();

    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ns);
    let cluster = che_cluster(&ns);
    let name = cluster.name_any();
    api.create(&PostParams::default(), &cluster)
        .await
        .expect("CheCluster created");

    wait_for(&api, &name, has_finalizer(OAUTH_CLIENT_FINALIZER), "finalizer").await;

    api.delete(&name, &DeleteParams::default())
        .await
        .expect("delete issued");

    // All finalizers removed means the API server can drop the object
    let gone = tokio::time::timeout(
        FAST_TIMEOUT,
        await_condition(api.clone(), &name, is_gone()),
    )
    .await
    .expect("CheCluster released after finalization");
    assert!(gone.is_ok());

    ctx.namespace.delete().await.expect("namespace deleted");
}

#[tokio::test]
#[ignore]
async fn second_cluster_in_the_namespace_reports_a_failure() {
    let ctx = setup("che-dup").await;
    let ns = ctx.namespace.name().to_string();

    let api: Api<CheCluster> = Api::namespaced(ctx.client.clone(), &ns);
    let mut first = che_cluster(&ns);
    first.metadata.name = Some("che-a".to_string());
    api.create(&PostParams::default(), &first)
        .await
        .expect("first CheCluster created");
    wait_for(&api, "che-a", has_finalizer(OAUTH_CLIENT_FINALIZER), "finalizer").await;

    let mut second = che_cluster(&ns);
    second.metadata.name = Some("che-b".to_string());
    api.create(&PostParams::default(), &second)
        .await
        .expect("second CheCluster created");

    // The newer CR is refused and carries the reason on its own status
    let duplicate = wait_for(
        &api,
        "che-b",
        has_failure_reason("MultipleCheClusters"),
        "singleton violation on status",
    )
    .await;
    assert!(duplicate.status.unwrap().message.unwrap().contains(&ns));

    // The older CR keeps being served
    let original = api.get("che-a").await.expect("first CheCluster still there");
    let reason = original.status.and_then(|s| s.reason);
    assert_ne!(reason.as_deref(), Some("MultipleCheClusters"));

    // Duplicates must still be deletable while the original exists
    api.delete("che-b", &DeleteParams::default())
        .await
        .expect("delete issued");
    let gone = tokio::time::timeout(
        FAST_TIMEOUT,
        await_condition(api.clone(), "che-b", is_gone()),
    )
    .await
    .expect("duplicate released after finalization");
    assert!(gone.is_ok());

    ctx.namespace.delete().await.expect("namespace deleted");
}
