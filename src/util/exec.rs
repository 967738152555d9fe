//! Command execution inside component pods via the Kubernetes exec API.
//!
//! Used for one-shot provisioning: creating the identity-provider database
//! in the PostgreSQL pod and provisioning the realm/client in the Keycloak
//! pod. Disabled entirely under MOCK_API.

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, ListParams};
use kube::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::util::env;

/// Find the first running pod matching a component label selector
pub async fn find_component_pod(
    client: &Client,
    namespace: &str,
    selector: &str,
) -> Result<Option<String>> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods.list(&ListParams::default().labels(selector)).await?;
    Ok(list
        .items
        .into_iter()
        .find(|p| {
            p.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Running")
        })
        .and_then(|p| p.metadata.name))
}

/// Execute a shell command in a pod, returning stdout.
///
/// Non-zero exit (status != Success) or anything on stderr containing
/// "ERROR" is reported as an ExecError. Under MOCK_API the call is a no-op
/// returning an empty string.
pub async fn exec_in_pod(
    client: &Client,
    namespace: &str,
    pod_name: &str,
    container: &str,
    command: &str,
) -> Result<String> {
    if env::mock_api() {
        debug!(pod = %pod_name, "MOCK_API set, skipping exec");
        return Ok(String::new());
    }

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);

    let attach_params = AttachParams {
        container: Some(container.to_string()),
        stdin: true,
        stdout: true,
        stderr: true,
        tty: false,
        ..Default::default()
    };

    let full = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
    let mut attached = pods
        .exec(pod_name, full, &attach_params)
        .await
        .map_err(Error::KubeError)?;

    // Close stdin to signal end of input
    if let Some(mut stdin) = attached.stdin() {
        stdin.shutdown().await?;
    }

    let stdout = attached.stdout().ok_or_else(|| Error::ExecError {
        pod: pod_name.to_string(),
        message: "failed to get stdout from exec".to_string(),
    })?;
    let stderr = attached.stderr().ok_or_else(|| Error::ExecError {
        pod: pod_name.to_string(),
        message: "failed to get stderr from exec".to_string(),
    })?;

    let stdout_output = read_stream(stdout).await?;
    let stderr_output = read_stream(stderr).await?;

    let status = attached.take_status().ok_or_else(|| Error::ExecError {
        pod: pod_name.to_string(),
        message: "failed to get status from exec".to_string(),
    })?;

    if let Some(status) = status.await {
        if status.status != Some("Success".to_string()) {
            let message = if stderr_output.is_empty() {
                format!("command failed with status: {:?}", status)
            } else {
                stderr_output.clone()
            };
            return Err(Error::ExecError {
                pod: pod_name.to_string(),
                message,
            });
        }
    }

    if !stderr_output.is_empty() && stderr_output.contains("ERROR") {
        return Err(Error::ExecError {
            pod: pod_name.to_string(),
            message: stderr_output,
        });
    }

    Ok(stdout_output)
}

async fn read_stream(mut stream: impl AsyncReadExt + Unpin) -> Result<String> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}
