//! Slicegrid core — shared domain model for the placement optimizer and
//! the pipeline deployer.
//!
//! # Components
//!
//! - **`types`** — layers, devices, slice blocks, the serialized `Configuration`
//! - **`report`** — benchmark report deserialization and lookups
//! - **`constraints`** — placement constraints and their CLI DSL parser
//! - **`config`** — `slice.toml` deployment preferences

pub mod config;
pub mod constraints;
pub mod error;
pub mod report;
pub mod types;

pub use config::SliceConfig;
pub use constraints::Constraints;
pub use error::{CoreError, CoreResult};
pub use report::{BenchmarkReport, DeviceReport, LayerPerformance, LinkPerformance};
pub use types::{Configuration, Device, Layer, LayerModel, SliceBlock, SliceModel};
