//! The fleet orchestration seam.
//!
//! `FleetApi` is the boundary to the fleet's orchestration plane: image
//! build/push, service create/remove, task-state polling, log capture.
//! The production adapter is [`crate::docker::CliFleet`]; tests drive
//! the deployer through a scripted in-memory implementation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DeployResult;

/// Environment variable naming the downstream service a pipeline member
/// forwards its output to.
pub const ENV_FORWARD: &str = "FORWARD";
/// Pipeline-front only: ordered, comma-separated slice service names.
pub const ENV_SLICES: &str = "SLICES";
/// Pipeline-front only: comma-separated input dimensions.
pub const ENV_INPUT_DIMS: &str = "INPUTDIMS";

/// Descriptor for one pipeline service.
///
/// Every service is pinned to exactly one node (hard affinity), runs a
/// single replica with restart policy "none" so failures surface
/// immediately, and attaches to the shared overlay network. Only the
/// pipeline-front service publishes a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    /// Device the single replica is pinned to.
    pub node: String,
    pub network: String,
    pub env: BTreeMap<String, String>,
    pub publish_port: Option<u16>,
}

impl ServiceSpec {
    pub fn forward_target(&self) -> Option<&str> {
        self.env.get(ENV_FORWARD).map(String::as_str)
    }
}

/// Observed state of one service task, as reported by the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    New,
    Allocated,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Ready,
    Starting,
    Running,
    Complete,
    Failed,
    Shutdown,
    Rejected,
    Orphaned,
    Remove,
}

impl TaskState {
    /// Parse a fleet-reported state string (leading word, any case).
    pub fn parse(s: &str) -> Option<TaskState> {
        let word = s.split_whitespace().next()?.to_ascii_lowercase();
        Some(match word.as_str() {
            "new" => TaskState::New,
            "allocated" => TaskState::Allocated,
            "pending" => TaskState::Pending,
            "assigned" => TaskState::Assigned,
            "accepted" => TaskState::Accepted,
            "preparing" => TaskState::Preparing,
            "ready" => TaskState::Ready,
            "starting" => TaskState::Starting,
            "running" => TaskState::Running,
            "complete" => TaskState::Complete,
            "failed" => TaskState::Failed,
            "shutdown" => TaskState::Shutdown,
            "rejected" => TaskState::Rejected,
            "orphaned" => TaskState::Orphaned,
            "remove" => TaskState::Remove,
            _ => return None,
        })
    }

    pub fn is_running(self) -> bool {
        self == TaskState::Running
    }

    /// Terminal-negative states: observing any of these before RUNNING
    /// fails the spawn.
    pub fn is_terminal_negative(self) -> bool {
        matches!(
            self,
            TaskState::Failed
                | TaskState::Shutdown
                | TaskState::Rejected
                | TaskState::Orphaned
                | TaskState::Remove
        )
    }
}

/// Operations the deployer needs from the fleet's orchestration plane.
///
/// All calls are request/response with no internal retries; errors are
/// surfaced to the deployer, which decides whether to unwind.
pub trait FleetApi {
    fn build_image(
        &self,
        context: &Path,
        tag: &str,
    ) -> impl Future<Output = DeployResult<()>> + Send;

    fn push_image(&self, tag: &str) -> impl Future<Output = DeployResult<()>> + Send;

    fn create_service(&self, spec: &ServiceSpec) -> impl Future<Output = DeployResult<()>> + Send;

    /// Current states of the service's tasks. An empty list means the
    /// fleet has not materialized any task yet.
    fn service_tasks(
        &self,
        name: &str,
    ) -> impl Future<Output = DeployResult<Vec<TaskState>>> + Send;

    fn service_logs(&self, name: &str) -> impl Future<Output = DeployResult<String>> + Send;

    fn remove_service(&self, name: &str) -> impl Future<Output = DeployResult<()>> + Send;

    fn remove_image(&self, tag: &str) -> impl Future<Output = DeployResult<()>> + Send;
}
