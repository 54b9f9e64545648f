//! Cost graph construction.
//!
//! The graph is leveled by layer index: level *i* holds one state per
//! (layer *i*, device) pair, plus a synthetic start/end state at the
//! source device. Transitions only ever move to the next level, so the
//! graph is a DAG ordered by layer index — except for the final edges,
//! which close the ring back to the start state. States are memoized by
//! (layer, device) so every route reaching the same state shares one
//! node and its outgoing edge list. Per-route bookkeeping (memory
//! accounting) is path-dependent and is never stored on a node; see
//! [`crate::feasibility`].

use std::collections::{HashMap, VecDeque};

use slice_core::{BenchmarkReport, Device, Layer};

use crate::error::SearchResult;

/// Index of a node in the graph's arena.
pub type NodeId = usize;

/// A placement decision point: `layer` running on `device`.
///
/// `layer == None` only for the synthetic start/end state at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlacementState {
    /// Index into the layer sequence, `None` for the synthetic state.
    pub layer: Option<usize>,
    /// Index into the device list.
    pub device: usize,
}

/// A weighted edge to the next level.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub target: NodeId,
    /// Predicted compute + transfer cost of taking this edge, seconds.
    pub penalty: f64,
}

/// The leveled placement graph. Written once by [`GraphBuilder`], then
/// read-only for the duration of the search.
#[derive(Debug)]
pub struct CostGraph {
    layers: Vec<Layer>,
    devices: Vec<Device>,
    source: usize,
    nodes: Vec<PlacementState>,
    edges: Vec<Vec<Transition>>,
    start: NodeId,
}

impl CostGraph {
    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn state(&self, id: NodeId) -> PlacementState {
        self.nodes[id]
    }

    pub fn transitions(&self, id: NodeId) -> &[Transition] {
        &self.edges[id]
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Index of the source device in [`Self::devices`].
    pub fn source_device(&self) -> usize {
        self.source
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Layer name of a node, for diagnostics.
    pub fn layer_name(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].layer.map(|i| self.layers[i].name.as_str())
    }
}

/// Builds a [`CostGraph`] from a benchmark report. The (layer, device)
/// memo table is owned by the builder, scoped to a single `build` call.
pub struct GraphBuilder<'a> {
    report: &'a BenchmarkReport,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(report: &'a BenchmarkReport) -> Self {
        Self { report }
    }

    /// Construct the graph level by level with an explicit worklist.
    ///
    /// `input_bytes` is the raw request-input size; it prices the edges
    /// returning to the source after the last layer.
    pub fn build(
        &self,
        layers: Vec<Layer>,
        source: &str,
        input_bytes: u64,
    ) -> SearchResult<CostGraph> {
        let devices = self.report.devices();
        let source_idx = devices
            .iter()
            .position(|d| d.name == source)
            .ok_or_else(|| slice_core::CoreError::UnknownDevice(source.to_string()))?;

        let mut nodes: Vec<PlacementState> = Vec::new();
        let mut edges: Vec<Vec<Transition>> = Vec::new();
        let mut memo: HashMap<PlacementState, NodeId> = HashMap::new();
        let mut worklist: VecDeque<NodeId> = VecDeque::new();

        let mut intern = |state: PlacementState,
                          nodes: &mut Vec<PlacementState>,
                          edges: &mut Vec<Vec<Transition>>,
                          worklist: &mut VecDeque<NodeId>| {
            *memo.entry(state).or_insert_with(|| {
                let id = nodes.len();
                nodes.push(state);
                edges.push(Vec::new());
                worklist.push_back(id);
                id
            })
        };

        let start = intern(
            PlacementState {
                layer: None,
                device: source_idx,
            },
            &mut nodes,
            &mut edges,
            &mut worklist,
        );

        while let Some(id) = worklist.pop_front() {
            let state = nodes[id];
            let from = &devices[state.device];
            // The synthetic state opens level 0; (layer i, _) opens level i+1.
            let level = state.layer.map_or(0, |i| i + 1);

            if level < layers.len() {
                let layer = &layers[level];
                let sent_bytes = self
                    .report
                    .layer(&from.name, &layer.name)?
                    .benchmark_output_bytes;
                let mut out = Vec::with_capacity(devices.len());
                for (d, to) in devices.iter().enumerate() {
                    let penalty = self.transfer_cost(&from.name, &to.name, sent_bytes)?
                        + self.report.layer(&to.name, &layer.name)?.benchmark_time_sec;
                    let target = intern(
                        PlacementState {
                            layer: Some(level),
                            device: d,
                        },
                        &mut nodes,
                        &mut edges,
                        &mut worklist,
                    );
                    out.push(Transition { target, penalty });
                }
                edges[id] = out;
            } else if id != start {
                // Past the last layer: one edge closing the ring, priced
                // with the request-input size.
                let penalty =
                    self.transfer_cost(&from.name, &devices[source_idx].name, input_bytes)?;
                edges[id] = vec![Transition {
                    target: start,
                    penalty,
                }];
            }
            // `id == start && level >= layers.len()` only when the layer
            // list is empty; the start state then has no outgoing edges.
        }

        tracing::debug!(
            nodes = nodes.len(),
            layers = layers.len(),
            devices = devices.len(),
            "cost graph built"
        );

        Ok(CostGraph {
            layers,
            devices,
            source: source_idx,
            nodes,
            edges,
            start,
        })
    }

    /// `latency + bytes / bandwidth`, in seconds.
    fn transfer_cost(&self, from: &str, to: &str, bytes: u64) -> SearchResult<f64> {
        let link = self.report.link(from, to)?;
        Ok(link.latency_ms / 1000.0 + bytes as f64 / link.bandwidth_bps)
    }
}
