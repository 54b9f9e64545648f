//! Core error types.

use thiserror::Error;

/// Errors raised while loading or validating slicegrid inputs.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed constraint expression: {0}")]
    MalformedConstraints(String),

    #[error("device not present in benchmark report: {0}")]
    UnknownDevice(String),

    #[error("layer {layer} was not benchmarked on device {device}")]
    LayerNotBenchmarked { layer: String, device: String },

    #[error(
        "output shape of {producer} does not chain into input of {consumer}: {output:?} vs {input:?}"
    )]
    ShapeMismatch {
        producer: String,
        consumer: String,
        output: Vec<u64>,
        input: Vec<u64>,
    },

    #[error("cannot compose an empty slice model")]
    EmptySliceModel,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
