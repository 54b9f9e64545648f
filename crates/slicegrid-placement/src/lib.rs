//! Slicegrid placement — decides which fleet device runs each model layer.
//!
//! Turns a benchmark report and an ordered layer list into a leveled cost
//! graph, searches it for the minimum-penalty closed route that assigns
//! every layer to exactly one device, and collapses the winner into
//! contiguous per-device slice blocks ready for deployment.
//!
//! # Components
//!
//! - **`graph`** — cost graph construction (memoized states, penalty edges)
//! - **`search`** — priority-queue closed-route search
//! - **`feasibility`** — pure full-route validation (constraints + memory)
//! - **`blocks`** — slice-block generation and model merging

pub mod blocks;
pub mod error;
pub mod feasibility;
pub mod graph;
pub mod search;

pub use blocks::{generate_blocks, jump_count};
pub use error::{SearchError, SearchResult};
pub use graph::{CostGraph, GraphBuilder, NodeId, PlacementState, Transition};
pub use search::{OptimalRoute, find_optimal_route};
