//! TLS bootstrap job and secret shape checks.
//!
//! On Kubernetes with TLS enabled the server needs a `che-tls` secret holding
//! the serving key pair. When the administrator does not supply one, a
//! one-shot job generates a self-signed pair and stores the CA alongside it
//! in `self-signed-certificate`.

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, Secret,
};
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::CheCluster;
use crate::resources::common::component_labels;
use crate::resources::rbac::TLS_JOB_SA;
use crate::util::env::image_for;

/// Serving key pair for the Che host
pub const CHE_TLS_SECRET: &str = "che-tls";
/// CA certificate produced by the self-signing job
pub const SELF_SIGNED_CERT_SECRET: &str = "self-signed-certificate";
/// Job that generates both secrets
pub const TLS_JOB_NAME: &str = "che-tls-job";

const TLS_JOB_COMPONENT: &str = "che-create-tls-secret-job";
const DEFAULT_TLS_JOB_IMAGE: &str = "quay.io/eclipse/che-tls-secret-creator:alpine-01eadb2";

fn has_non_empty_key(secret: &Secret, key: &str) -> bool {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .is_some_and(|bytes| !bytes.0.is_empty())
}

/// A serving secret is usable when it carries both halves of the key pair
/// with non-empty values.
pub fn is_valid_tls_secret(secret: &Secret) -> bool {
    has_non_empty_key(secret, "tls.crt") && has_non_empty_key(secret, "tls.key")
}

/// The CA secret only needs the certificate.
pub fn is_valid_ca_secret(secret: &Secret) -> bool {
    has_non_empty_key(secret, "ca.crt")
}

pub fn tls_job(cluster: &CheCluster) -> Job {
    let ns = cluster.namespace().unwrap_or_default();
    let ingress_domain = cluster.spec.k8s.ingress_domain.as_deref().unwrap_or_default();
    let domain = format!("*.{ingress_domain}");
    let image = image_for("tls_secret_creator", None, DEFAULT_TLS_JOB_IMAGE);
    Job {
        metadata: ObjectMeta {
            name: Some(TLS_JOB_NAME.to_string()),
            namespace: Some(ns),
            labels: Some(component_labels(cluster, TLS_JOB_COMPONENT)),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(3),
            completions: Some(1),
            parallelism: Some(1),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(component_labels(cluster, TLS_JOB_COMPONENT)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(TLS_JOB_SA.to_string()),
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: TLS_JOB_NAME.to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env: Some(vec![
                            EnvVar {
                                name: "DOMAIN".to_string(),
                                value: Some(domain),
                                ..Default::default()
                            },
                            EnvVar {
                                name: "CHE_SERVER_TLS_SECRET_NAME".to_string(),
                                value: Some(CHE_TLS_SECRET.to_string()),
                                ..Default::default()
                            },
                            EnvVar {
                                name: "CHE_CA_CERTIFICATE_SECRET_NAME".to_string(),
                                value: Some(SELF_SIGNED_CERT_SECRET.to_string()),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// True once the job reports at least one successful completion.
pub fn job_succeeded(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.succeeded)
        .unwrap_or(0)
        > 0
}
