//! Domain types shared by the placement search and the deployer.
//!
//! These types represent the split model (layers and their saved
//! sub-model artifacts), the fleet (devices), and the terminal artifact
//! of the search (`Configuration`), which is serialized to JSON so the
//! configure and deploy stages can run as independent invocations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constraints::Constraints;
use crate::error::{CoreError, CoreResult};

// ── Layers and devices ─────────────────────────────────────────────

/// One layer of the split model, with its benchmarked memory footprint.
///
/// The ordered layer list defines inference order. Names are unique and
/// match the keys of the benchmark report's `modelPerformance` maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Resident weights, in bytes.
    pub model_memory_usage: u64,
    /// Hidden activations plus input buffer, in bytes.
    pub hidden_memory_usage: u64,
    /// Serialized-tensor transfer buffer, charged on device handoff, in bytes.
    pub io_memory_usage: u64,
}

/// A fleet member capable of hosting slice services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Memory available for slices, in bytes.
    pub free_memory: u64,
}

// ── Model artifacts ────────────────────────────────────────────────

/// A saved sub-model produced by the external slicing collaborator.
///
/// Shapes exclude the batch axis. The manifest's order defines the
/// inference order of the layer sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerModel {
    pub name: String,
    /// Path to the serialized sub-model on disk.
    pub artifact: PathBuf,
    pub input_shape: Vec<u64>,
    pub output_shape: Vec<u64>,
}

impl LayerModel {
    /// Load the ordered layer-model manifest (a JSON array).
    pub fn load_manifest(path: &Path) -> CoreResult<Vec<LayerModel>> {
        let content = std::fs::read_to_string(path)?;
        let models: Vec<LayerModel> = serde_json::from_str(&content)?;
        tracing::debug!(models = models.len(), path = %path.display(), "layer manifest loaded");
        Ok(models)
    }
}

/// A merged sub-model: the layer models of one slice composed in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceModel {
    pub parts: Vec<LayerModel>,
    pub input_shape: Vec<u64>,
    pub output_shape: Vec<u64>,
}

impl SliceModel {
    /// Compose consecutive layer models into one merged model.
    ///
    /// Adjacent parts must chain: each part's output shape has to match
    /// the next part's input shape.
    pub fn compose(parts: &[LayerModel]) -> CoreResult<SliceModel> {
        let (first, rest) = parts.split_first().ok_or(CoreError::EmptySliceModel)?;
        let mut prev = first;
        for part in rest {
            if prev.output_shape != part.input_shape {
                return Err(CoreError::ShapeMismatch {
                    producer: prev.name.clone(),
                    consumer: part.name.clone(),
                    output: prev.output_shape.clone(),
                    input: part.input_shape.clone(),
                });
            }
            prev = part;
        }
        Ok(SliceModel {
            parts: parts.to_vec(),
            input_shape: first.input_shape.clone(),
            output_shape: prev.output_shape.clone(),
        })
    }
}

// ── Slice blocks ───────────────────────────────────────────────────

/// A contiguous run of layers assigned to one device, packaged as one
/// deployable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceBlock {
    pub layers: Vec<Layer>,
    pub device: Device,
    /// Half-open index range into the layer sequence.
    pub start: usize,
    pub end: usize,
    pub model: SliceModel,
}

impl SliceBlock {
    /// Service name for this block within a project's pipeline.
    pub fn service_name(&self, project: &str) -> String {
        format!("{}-slice-{}-{}", project, self.start, self.end)
    }

    /// Total resident memory of the block's layers (weights + hidden), bytes.
    pub fn resident_memory(&self) -> u64 {
        self.layers
            .iter()
            .map(|l| l.model_memory_usage + l.hidden_memory_usage)
            .sum()
    }
}

// ── Configuration ──────────────────────────────────────────────────

/// The full search result — the terminal artifact of the configure stage
/// and the sole input of the deploy stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub layers: Vec<Layer>,
    pub blocks: Vec<SliceBlock>,
    pub devices: Vec<Device>,
    pub constraints: Constraints,
    pub source_device: Device,
    /// Declared input shape of the pipeline (first block's merged model).
    pub input_shape: Vec<u64>,
    /// Memory budget multiplier the search was run with.
    pub memory_multiplier: f64,
    /// Total predicted penalty of the winning route, seconds.
    pub penalty: f64,
    /// Number of device handoffs along the winning route.
    pub jumps: u32,
}

impl Configuration {
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> CoreResult<Configuration> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Render the placement as a plain-text table for the CLI.
    pub fn summary_table(&self) -> String {
        const MB: f64 = 1_000_000.0;
        let mut rows = vec![vec![
            "Slice".to_string(),
            "Device".to_string(),
            "Budget (MB)".to_string(),
            "Model (MB)".to_string(),
            "Hidden (MB)".to_string(),
            "IO (MB)".to_string(),
        ]];
        for block in &self.blocks {
            let model: u64 = block.layers.iter().map(|l| l.model_memory_usage).sum();
            let hidden: u64 = block.layers.iter().map(|l| l.hidden_memory_usage).sum();
            let io = block.layers.first().map_or(0, |l| l.io_memory_usage);
            rows.push(vec![
                format!("[{}, {})", block.start, block.end),
                block.device.name.clone(),
                format!(
                    "{:.2}",
                    block.device.free_memory as f64 * self.memory_multiplier / MB
                ),
                format!("{:.2}", model as f64 / MB),
                format!("{:.2}", hidden as f64 / MB),
                format!("{:.2}", io as f64 / MB),
            ]);
        }

        let widths: Vec<usize> = (0..rows[0].len())
            .map(|col| rows.iter().map(|r| r[col].len()).max().unwrap_or(0))
            .collect();
        let mut out = String::new();
        for (i, row) in rows.iter().enumerate() {
            for (cell, &width) in row.iter().zip(&widths) {
                out.push_str(&format!("{cell:<width$}  "));
            }
            out.push('\n');
            if i == 0 {
                for width in &widths {
                    out.push_str(&"-".repeat(*width));
                    out.push_str("  ");
                }
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_model(name: &str, input: &[u64], output: &[u64]) -> LayerModel {
        LayerModel {
            name: name.to_string(),
            artifact: PathBuf::from(format!("/tmp/{name}.bin")),
            input_shape: input.to_vec(),
            output_shape: output.to_vec(),
        }
    }

    fn layer(name: &str) -> Layer {
        Layer {
            name: name.to_string(),
            model_memory_usage: 1_000,
            hidden_memory_usage: 500,
            io_memory_usage: 100,
        }
    }

    #[test]
    fn compose_chains_shapes() {
        let parts = vec![
            layer_model("a", &[28, 28], &[14, 14]),
            layer_model("b", &[14, 14], &[10]),
        ];
        let merged = SliceModel::compose(&parts).unwrap();
        assert_eq!(merged.input_shape, vec![28, 28]);
        assert_eq!(merged.output_shape, vec![10]);
        assert_eq!(merged.parts.len(), 2);
    }

    #[test]
    fn compose_rejects_shape_mismatch() {
        let parts = vec![
            layer_model("a", &[28, 28], &[14, 14]),
            layer_model("b", &[7, 7], &[10]),
        ];
        let err = SliceModel::compose(&parts).unwrap_err();
        assert!(matches!(err, CoreError::ShapeMismatch { .. }));
    }

    #[test]
    fn compose_rejects_empty() {
        let err = SliceModel::compose(&[]).unwrap_err();
        assert!(matches!(err, CoreError::EmptySliceModel));
    }

    #[test]
    fn block_service_name_includes_range() {
        let block = SliceBlock {
            layers: vec![layer("l0"), layer("l1")],
            device: Device {
                name: "worker-a".to_string(),
                free_memory: 1_000_000,
            },
            start: 0,
            end: 2,
            model: SliceModel::compose(&[layer_model("l0", &[4], &[4])]).unwrap(),
        };
        assert_eq!(block.service_name("demo"), "demo-slice-0-2");
        assert_eq!(block.resident_memory(), 3_000);
    }

    #[test]
    fn configuration_roundtrips_through_json() {
        let config = Configuration {
            layers: vec![layer("l0")],
            blocks: vec![],
            devices: vec![Device {
                name: "worker-a".to_string(),
                free_memory: 8_000_000,
            }],
            constraints: Constraints::default(),
            source_device: Device {
                name: "worker-a".to_string(),
                free_memory: 8_000_000,
            },
            input_shape: vec![28, 28, 1],
            memory_multiplier: 0.8,
            penalty: 0.125,
            jumps: 2,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configuration.json");
        config.save(&path).unwrap();
        let loaded = Configuration::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn summary_table_lists_blocks() {
        let config = Configuration {
            layers: vec![layer("l0")],
            blocks: vec![SliceBlock {
                layers: vec![layer("l0")],
                device: Device {
                    name: "worker-a".to_string(),
                    free_memory: 8_000_000,
                },
                start: 0,
                end: 1,
                model: SliceModel::compose(&[layer_model("l0", &[4], &[4])]).unwrap(),
            }],
            devices: vec![],
            constraints: Constraints::default(),
            source_device: Device {
                name: "worker-a".to_string(),
                free_memory: 8_000_000,
            },
            input_shape: vec![4],
            memory_multiplier: 1.0,
            penalty: 0.5,
            jumps: 0,
        };
        let table = config.summary_table();
        assert!(table.contains("worker-a"));
        assert!(table.contains("[0, 1)"));
    }
}
