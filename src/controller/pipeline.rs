//! Ordered composition of phase reconcilers.
//!
//! Each phase drives one slice of the platform (permissions, TLS, database,
//! identity provider, OAuth, registries, server) and yields the tick by
//! returning a [`PhaseResult`] instead of sleeping. The manager runs phases
//! in registration order and stops at the first phase that is not done; on
//! CR deletion every phase gets its `finalize` called, success or not, so
//! independently owned cluster-scoped state is always given a chance to be
//! cleaned up.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::controller::context::DeployContext;
use crate::controller::error::Result;

/// Outcome of one phase for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    /// Requeue hint when the phase is waiting on the cluster
    pub requeue_after: Option<Duration>,
    /// Whether the pipeline may proceed to the next phase
    pub done: bool,
}

impl PhaseResult {
    /// Phase converged, continue the pipeline
    pub fn done() -> Self {
        Self {
            requeue_after: None,
            done: true,
        }
    }

    /// Phase is waiting on the cluster, re-enter after `d`
    pub fn requeue(d: Duration) -> Self {
        Self {
            requeue_after: Some(d),
            done: false,
        }
    }

    /// Phase blocked without a timer; the next CR edit re-triggers
    pub fn blocked() -> Self {
        Self {
            requeue_after: None,
            done: false,
        }
    }
}

/// One step of the reconcile pipeline.
///
/// Errors abort the tick (fail-fast); a phase that wants the pipeline to
/// wait without failing returns `done: false`. Generic over the context so
/// ordering can be exercised without a cluster.
#[async_trait]
pub trait Reconcilable<C = DeployContext>: Send + Sync {
    /// Phase name used for error wrapping and logs
    fn name(&self) -> &'static str;

    async fn reconcile(&self, ctx: &mut C) -> Result<PhaseResult>;

    /// Cleanup on CR deletion. Returns whether this phase's cleanup is
    /// complete; must be idempotent across attempts.
    async fn finalize(&self, ctx: &mut C) -> bool;
}

/// Ordered phase list, stable across ticks
pub struct ReconcileManager<C = DeployContext> {
    phases: Vec<Box<dyn Reconcilable<C>>>,
}

impl<C: Send> ReconcileManager<C> {
    pub fn new() -> Self {
        Self { phases: Vec::new() }
    }

    pub fn add(&mut self, phase: Box<dyn Reconcilable<C>>) {
        self.phases.push(phase);
    }

    /// Run phases in order; return at the first phase that is not done.
    /// Errors are wrapped with the phase name.
    pub async fn reconcile_all(&self, ctx: &mut C) -> Result<PhaseResult> {
        for phase in &self.phases {
            let result = phase
                .reconcile(ctx)
                .await
                .map_err(|e| e.in_phase(phase.name()))?;
            if !result.done {
                info!(phase = phase.name(), requeue = ?result.requeue_after, "Phase not done, yielding tick");
                return Ok(result);
            }
        }
        Ok(PhaseResult::done())
    }

    /// Invoke every phase's finalize, aggregating with logical AND. Never
    /// short-circuits: each phase owns independent cluster-scoped state and
    /// must get a chance to clean up even if a peer failed.
    pub async fn finalize_all(&self, ctx: &mut C) -> bool {
        let mut all_done = true;
        for phase in &self.phases {
            let done = phase.finalize(ctx).await;
            if !done {
                warn!(phase = phase.name(), "Finalization incomplete, will retry");
            }
            all_done &= done;
        }
        all_done
    }
}

impl<C: Send> Default for ReconcileManager<C> {
    fn default() -> Self {
        Self::new()
    }
}
