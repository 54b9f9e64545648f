//! Slice-block generation.
//!
//! Pure functions over the winning route: collapse consecutive
//! same-device states into [`SliceBlock`]s, merge each block's layer
//! models, and compute route statistics.

use slice_core::{LayerModel, SliceBlock, SliceModel};

use crate::error::{SearchError, SearchResult};
use crate::graph::CostGraph;
use crate::search::OptimalRoute;

/// Collapse the winning route into contiguous same-device blocks.
///
/// The synthetic start/end states are excluded. `models` is the ordered
/// layer-model manifest; each block's models are composed in order into
/// its merged [`SliceModel`]. A route that never changes device yields a
/// single block spanning every layer.
pub fn generate_blocks(
    graph: &CostGraph,
    route: &OptimalRoute,
    models: &[LayerModel],
) -> SearchResult<Vec<SliceBlock>> {
    // (layer index, device index) pairs, synthetic endpoints dropped.
    let steps: Vec<(usize, usize)> = route
        .nodes
        .iter()
        .filter_map(|&id| {
            let state = graph.state(id);
            state.layer.map(|l| (l, state.device))
        })
        .collect();

    let mut blocks = Vec::new();
    let mut start = 0usize;
    for i in 1..=steps.len() {
        let cut = i == steps.len() || steps[i].1 != steps[start].1;
        if !cut {
            continue;
        }
        let device_idx = steps[start].1;
        let (lo, hi) = (steps[start].0, steps[i - 1].0 + 1);
        let layers = graph.layers()[lo..hi].to_vec();

        let parts: Vec<LayerModel> = layers
            .iter()
            .map(|layer| {
                models
                    .iter()
                    .find(|m| m.name == layer.name)
                    .cloned()
                    .ok_or_else(|| SearchError::MissingModel(layer.name.clone()))
            })
            .collect::<SearchResult<_>>()?;

        blocks.push(SliceBlock {
            layers,
            device: graph.devices()[device_idx].clone(),
            start: lo,
            end: hi,
            model: SliceModel::compose(&parts)?,
        });
        start = i;
    }

    tracing::debug!(blocks = blocks.len(), "route collapsed into slice blocks");
    Ok(blocks)
}

/// Number of device handoffs along the route, synthetic endpoints
/// included (a pipeline whose first slice is off the source device pays
/// a transfer before the first layer runs).
pub fn jump_count(graph: &CostGraph, route: &OptimalRoute) -> u32 {
    let mut jumps = 0;
    let mut prev: Option<usize> = None;
    for &id in &route.nodes {
        let device = graph.state(id).device;
        if let Some(p) = prev {
            if p != device {
                jumps += 1;
            }
        }
        prev = Some(device);
    }
    jumps
}
