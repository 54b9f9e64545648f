//! Deployer error types.

use thiserror::Error;

/// Errors that can occur while deploying a pipeline.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Image build or push failed. Raised before any spawn; the run is
    /// aborted with nothing scheduled on the fleet.
    #[error("image build/push failed for {image}: {reason}")]
    BuildOrPush { image: String, reason: String },

    /// A service reached a terminal-negative state or timed out before
    /// stabilizing. Carries the captured service logs; already-spawned
    /// services have been torn down.
    #[error("service {service} failed to start: {reason}")]
    ServiceSpawn {
        service: String,
        reason: String,
        logs: String,
    },

    #[error("configuration contains no slice blocks")]
    EmptyPipeline,

    #[error("fleet api error: {0}")]
    Fleet(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DeployResult<T> = Result<T, DeployError>;
