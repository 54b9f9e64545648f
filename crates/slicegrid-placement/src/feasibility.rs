//! Full-route feasibility validation.
//!
//! Pure functions over a candidate route, deliberately decoupled from
//! the search's relaxation strategy so alternative searches (A*,
//! branch-and-bound) can reuse them unchanged. Memory accounting is
//! path-dependent and is always recomputed from the route here — never
//! cached on the shared graph nodes.

use slice_core::Constraints;

use crate::graph::{CostGraph, NodeId};

/// Placement constraints plus memory budgets, over the whole route.
pub fn route_is_feasible(
    graph: &CostGraph,
    route: &[NodeId],
    constraints: &Constraints,
    memory_multiplier: f64,
) -> bool {
    placement_constraints_hold(graph, route, constraints)
        && memory_within_budget(graph, route, memory_multiplier)
}

/// Every `must` pair assigns its layer to that device; every `mustnot`
/// pair keeps its layer off that device.
pub fn placement_constraints_hold(
    graph: &CostGraph,
    route: &[NodeId],
    constraints: &Constraints,
) -> bool {
    for &id in route {
        let state = graph.state(id);
        let Some(layer_idx) = state.layer else {
            continue;
        };
        let layer = &graph.layers()[layer_idx].name;
        let device = &graph.devices()[state.device].name;

        if let Some(required) = constraints.must_be_on_device.get(layer) {
            if required != device {
                return false;
            }
        }
        if let Some(banned) = constraints.must_not_be_on_device.get(layer) {
            if banned == device {
                return false;
            }
        }
    }
    true
}

/// Replay the route's memory accumulation: each layer adds its weights
/// and hidden buffers to the active device; a device handoff additionally
/// charges the layer's serialized-tensor transfer buffer to the new
/// device. No prefix may push any device past
/// `free_memory × memory_multiplier`.
pub fn memory_within_budget(
    graph: &CostGraph,
    route: &[NodeId],
    memory_multiplier: f64,
) -> bool {
    let devices = graph.devices();
    let mut usage = vec![0u64; devices.len()];
    let Some((&first, rest)) = route.split_first() else {
        return true;
    };
    let mut prev_device = graph.state(first).device;

    for &id in rest {
        let state = graph.state(id);
        let Some(layer_idx) = state.layer else {
            continue;
        };
        let layer = &graph.layers()[layer_idx];

        usage[state.device] += layer.model_memory_usage + layer.hidden_memory_usage;
        if state.device != prev_device {
            usage[state.device] += layer.io_memory_usage;
        }
        prev_device = state.device;

        let budget = devices[state.device].free_memory as f64 * memory_multiplier;
        if usage[state.device] as f64 > budget {
            return false;
        }
    }
    true
}
