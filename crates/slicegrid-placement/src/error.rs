//! Placement error types.

use thiserror::Error;

/// Errors that can occur while building the cost graph or searching it.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The queue emptied before a closed route was found. Carries the
    /// deepest layer the frontier reached — the first layer with no
    /// feasible placement.
    #[error("no feasible placement exists (search exhausted at layer {layer})")]
    Infeasible { layer: String },

    #[error("constraint names unknown layer: {0}")]
    UnknownConstraintLayer(String),

    #[error("constraint names unknown device: {0}")]
    UnknownConstraintDevice(String),

    #[error("layer manifest entry missing for layer {0}")]
    MissingModel(String),

    #[error("input error: {0}")]
    Core(#[from] slice_core::CoreError),
}

pub type SearchResult<T> = Result<T, SearchError>;
