//! Benchmark report deserialization.
//!
//! The report is produced by the external benchmarking collaborator: one
//! entry per device, carrying its free memory, per-layer compute
//! measurements, and per-peer network measurements. Keys are camelCase
//! on the wire; maps are kept ordered so device enumeration is
//! deterministic across runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{Device, Layer};

/// Full benchmark report, keyed by device name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport(pub BTreeMap<String, DeviceReport>);

/// Measurements taken on a single device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    /// Memory available for slices on this device, bytes.
    pub free_memory: u64,
    /// Per-layer compute measurements, keyed by layer name.
    pub model_performance: BTreeMap<String, LayerPerformance>,
    /// Network measurements towards each peer device, keyed by peer name.
    pub network_performance: BTreeMap<String, LinkPerformance>,
}

/// Compute cost and memory footprint of one layer on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPerformance {
    pub benchmark_time_sec: f64,
    pub benchmark_output_bytes: u64,
    pub benchmark_model_memory: u64,
    pub benchmark_hidden_memory: u64,
    pub benchmark_io_multiplier: u64,
}

/// Network cost towards a peer device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPerformance {
    pub latency_ms: f64,
    pub bandwidth_bps: f64,
}

impl BenchmarkReport {
    pub fn from_file(path: &Path) -> CoreResult<BenchmarkReport> {
        let content = std::fs::read_to_string(path)?;
        let report: BenchmarkReport = serde_json::from_str(&content)?;
        tracing::debug!(devices = report.0.len(), path = %path.display(), "benchmark report loaded");
        Ok(report)
    }

    /// All devices in the report, in name order.
    pub fn devices(&self) -> Vec<Device> {
        self.0
            .iter()
            .map(|(name, report)| Device {
                name: name.clone(),
                free_memory: report.free_memory,
            })
            .collect()
    }

    pub fn device(&self, name: &str) -> CoreResult<&DeviceReport> {
        self.0
            .get(name)
            .ok_or_else(|| CoreError::UnknownDevice(name.to_string()))
    }

    /// Per-layer measurement for `layer` as taken on `device`.
    pub fn layer(&self, device: &str, layer: &str) -> CoreResult<&LayerPerformance> {
        self.device(device)?.model_performance.get(layer).ok_or_else(|| {
            CoreError::LayerNotBenchmarked {
                layer: layer.to_string(),
                device: device.to_string(),
            }
        })
    }

    /// Network measurement for the link `from` → `to`.
    pub fn link(&self, from: &str, to: &str) -> CoreResult<&LinkPerformance> {
        self.device(from)?
            .network_performance
            .get(to)
            .ok_or_else(|| CoreError::UnknownDevice(to.to_string()))
    }

    /// Build the ordered [`Layer`] list by resolving `names` against the
    /// measurements taken on the source device.
    pub fn resolve_layers(&self, source: &str, names: &[String]) -> CoreResult<Vec<Layer>> {
        names
            .iter()
            .map(|name| {
                let perf = self.layer(source, name)?;
                Ok(Layer {
                    name: name.clone(),
                    model_memory_usage: perf.benchmark_model_memory,
                    hidden_memory_usage: perf.benchmark_hidden_memory,
                    io_memory_usage: perf.benchmark_io_multiplier,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "worker-a": {
            "freeMemory": 8000000,
            "modelPerformance": {
                "layer_0": {
                    "benchmarkTimeSec": 0.002,
                    "benchmarkOutputBytes": 1328,
                    "benchmarkModelMemory": 200000,
                    "benchmarkHiddenMemory": 50000,
                    "benchmarkIoMultiplier": 4000
                },
                "layer_1": {
                    "benchmarkTimeSec": 0.004,
                    "benchmarkOutputBytes": 928,
                    "benchmarkModelMemory": 300000,
                    "benchmarkHiddenMemory": 60000,
                    "benchmarkIoMultiplier": 4000
                }
            },
            "networkPerformance": {
                "worker-a": { "latencyMs": 0.0, "bandwidthBps": 27000000000.0 },
                "worker-b": { "latencyMs": 0.35, "bandwidthBps": 916000000.0 }
            }
        },
        "worker-b": {
            "freeMemory": 4000000,
            "modelPerformance": {
                "layer_0": {
                    "benchmarkTimeSec": 0.001,
                    "benchmarkOutputBytes": 1328,
                    "benchmarkModelMemory": 200000,
                    "benchmarkHiddenMemory": 50000,
                    "benchmarkIoMultiplier": 4000
                },
                "layer_1": {
                    "benchmarkTimeSec": 0.002,
                    "benchmarkOutputBytes": 928,
                    "benchmarkModelMemory": 300000,
                    "benchmarkHiddenMemory": 60000,
                    "benchmarkIoMultiplier": 4000
                }
            },
            "networkPerformance": {
                "worker-a": { "latencyMs": 0.29, "bandwidthBps": 882000000.0 },
                "worker-b": { "latencyMs": 0.0, "bandwidthBps": 33000000000.0 }
            }
        }
    }"#;

    #[test]
    fn parses_camel_case_report() {
        let report: BenchmarkReport = serde_json::from_str(SAMPLE).unwrap();
        let perf = report.layer("worker-a", "layer_0").unwrap();
        assert_eq!(perf.benchmark_output_bytes, 1328);
        assert_eq!(perf.benchmark_model_memory, 200_000);

        let link = report.link("worker-a", "worker-b").unwrap();
        assert!((link.latency_ms - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn devices_are_name_ordered() {
        let report: BenchmarkReport = serde_json::from_str(SAMPLE).unwrap();
        let devices = report.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "worker-a");
        assert_eq!(devices[1].name, "worker-b");
        assert_eq!(devices[1].free_memory, 4_000_000);
    }

    #[test]
    fn resolve_layers_preserves_order() {
        let report: BenchmarkReport = serde_json::from_str(SAMPLE).unwrap();
        let names = vec!["layer_0".to_string(), "layer_1".to_string()];
        let layers = report.resolve_layers("worker-a", &names).unwrap();
        assert_eq!(layers[0].name, "layer_0");
        assert_eq!(layers[1].hidden_memory_usage, 60_000);
        assert_eq!(layers[0].io_memory_usage, 4_000);
    }

    #[test]
    fn unknown_layer_is_an_error() {
        let report: BenchmarkReport = serde_json::from_str(SAMPLE).unwrap();
        let err = report.layer("worker-a", "layer_9").unwrap_err();
        assert!(matches!(err, CoreError::LayerNotBenchmarked { .. }));
    }

    #[test]
    fn unknown_device_is_an_error() {
        let report: BenchmarkReport = serde_json::from_str(SAMPLE).unwrap();
        assert!(matches!(
            report.device("worker-z").unwrap_err(),
            CoreError::UnknownDevice(_)
        ));
    }
}
