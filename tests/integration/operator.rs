//! Operator spawning utilities for integration tests
//!
//! Each test gets its own operator instance scoped to its namespace, so
//! tests can run without interfering with each other.

use kube::Client;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use che_operator::run_controller_scoped;

/// A scoped operator that runs for the duration of a test
pub struct ScopedOperator {
    // Option so `stop` can take the handle despite the Drop impl
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ScopedOperator {
    /// Start an operator watching only the given namespace. It is stopped
    /// when `stop` is called or the struct is dropped.
    pub async fn start(client: Client, namespace: &str) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ns = namespace.to_string();

        tracing::info!("Starting scoped operator controller...");

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = run_controller_scoped(client, None, Some(&ns)) => {
                    tracing::debug!("Operator exited normally");
                }
                _ = shutdown_rx => {
                    tracing::debug!("Operator received shutdown signal");
                }
            }
        });

        // Give the controller a moment to start watching
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        Self {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
