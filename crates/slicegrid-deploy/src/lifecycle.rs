//! Per-service lifecycle: `BUILD → PUSHED → SPAWN_REQUESTED → RUNNING | FAILED`.
//!
//! The phase machine is driven by the orchestrator; this module owns the
//! phase type, the fold from polled task states to a stability verdict,
//! and the interval-based stabilization loop.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{DeployError, DeployResult};
use crate::fleet::{FleetApi, TaskState};

/// Upper bound on a single status poll round-trip.
const POLL_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle phase of one pipeline service.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServicePhase {
    /// Image staged and built locally.
    Build,
    /// Image published to the registry.
    Pushed,
    /// Service descriptor submitted; awaiting stabilization.
    SpawnRequested,
    /// All tasks observed running.
    Running,
    /// Terminal-negative task state or startup timeout.
    Failed { reason: String },
}

/// Verdict over one poll of a service's task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Every task is running.
    Stable,
    /// No verdict yet; keep polling.
    Pending,
    /// A task reached a terminal-negative state.
    Broken(TaskState),
}

/// Fold polled task states into a stability verdict.
///
/// An empty poll counts as pending — the fleet may not have
/// materialized the task yet.
pub fn assess(tasks: &[TaskState]) -> Stability {
    if let Some(&broken) = tasks.iter().find(|t| t.is_terminal_negative()) {
        return Stability::Broken(broken);
    }
    if !tasks.is_empty() && tasks.iter().all(|t| t.is_running()) {
        return Stability::Stable;
    }
    Stability::Pending
}

/// Poll `service` until every task runs, or fail.
///
/// Polls at `poll_interval` with a bounded per-poll timeout, up to the
/// `startup_timeout` deadline. On a terminal-negative state or deadline
/// expiry, captures the service's logs (best effort) and returns
/// [`DeployError::ServiceSpawn`].
pub async fn stabilize<F: FleetApi>(
    fleet: &F,
    service: &str,
    poll_interval: Duration,
    startup_timeout: Duration,
) -> DeployResult<()> {
    let deadline = Instant::now() + startup_timeout;

    loop {
        let tasks = tokio::time::timeout(POLL_RPC_TIMEOUT, fleet.service_tasks(service))
            .await
            .map_err(|_| DeployError::Fleet(format!("status poll for {service} timed out")))??;

        match assess(&tasks) {
            Stability::Stable => {
                debug!(%service, tasks = tasks.len(), "service stabilized");
                return Ok(());
            }
            Stability::Broken(state) => {
                warn!(%service, ?state, "service task reached terminal state");
                return Err(spawn_failure(fleet, service, format!("task state {state:?}")).await);
            }
            Stability::Pending => {
                if Instant::now() >= deadline {
                    warn!(%service, timeout = ?startup_timeout, "service startup timed out");
                    return Err(spawn_failure(
                        fleet,
                        service,
                        format!("startup timeout after {startup_timeout:?}"),
                    )
                    .await);
                }
                debug!(%service, ?tasks, "service not stable yet");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

/// Build a [`DeployError::ServiceSpawn`], capturing logs best-effort.
async fn spawn_failure<F: FleetApi>(fleet: &F, service: &str, reason: String) -> DeployError {
    let logs = fleet
        .service_logs(service)
        .await
        .unwrap_or_else(|e| format!("<log capture failed: {e}>"));
    DeployError::ServiceSpawn {
        service: service.to_string(),
        reason,
        logs,
    }
}
