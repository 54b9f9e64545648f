//! Slicegrid deployer — turns a placement [`Configuration`] into a
//! running pipeline of services on the fleet.
//!
//! One service per slice block plus one pipeline-front service, spawned
//! in dependency order as a closed ring: front → slice 0 → … → slice
//! N-1 → front. Every service must stabilize before the next is
//! spawned; any failure unwinds the whole deployment.
//!
//! # Components
//!
//! - **`fleet`** — the `FleetApi` seam and service descriptors
//! - **`docker`** — container-CLI adapter implementing `FleetApi`
//! - **`image`** — build-context staging and content-digest tagging
//! - **`lifecycle`** — per-service phase machine and stabilization
//! - **`orchestrator`** — the pipeline deployer and cleanup registry
//!
//! [`Configuration`]: slice_core::Configuration

pub mod docker;
pub mod error;
pub mod fleet;
pub mod image;
pub mod lifecycle;
pub mod orchestrator;

pub use docker::CliFleet;
pub use error::{DeployError, DeployResult};
pub use fleet::{FleetApi, ServiceSpec, TaskState};
pub use image::StagedImage;
pub use lifecycle::{ServicePhase, Stability};
pub use orchestrator::{DeployOptions, PipelineDeployer, ServiceRecord};
