//! Priority-queue search for the minimum-penalty closed route.
//!
//! Dijkstra-shaped, but feasibility depends on the whole route prefix
//! (cumulative per-device memory), so there is no global best-distance
//! table: every queue entry carries its own route and visited set, and
//! candidate routes are re-validated in full. Termination follows from
//! the graph being leveled by layer index — every transition advances
//! one level until the single closing edge back to the start.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use slice_core::Constraints;
use tracing::debug;

use crate::error::{SearchError, SearchResult};
use crate::feasibility::route_is_feasible;
use crate::graph::{CostGraph, NodeId};

/// The winning route: start state, one state per layer in order, start
/// state again — plus its total penalty in seconds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OptimalRoute {
    pub nodes: Vec<NodeId>,
    pub penalty: f64,
}

/// One frontier entry. `route` holds the states walked so far, excluding
/// `node` itself; `visited` is the path-local visited set.
struct QueueEntry {
    penalty: f64,
    /// Monotonic push counter; breaks penalty ties deterministically.
    seq: u64,
    node: NodeId,
    route: Vec<NodeId>,
    visited: HashSet<NodeId>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Min-heap: lower penalty pops first, earlier push wins ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .penalty
            .total_cmp(&self.penalty)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Find the minimum-total-penalty walk from the start state through every
/// layer level exactly once and back to the start state.
///
/// Returns [`SearchError::Infeasible`] if the queue empties first.
pub fn find_optimal_route(
    graph: &CostGraph,
    constraints: &Constraints,
    memory_multiplier: f64,
) -> SearchResult<OptimalRoute> {
    validate_constraints(graph, constraints)?;

    let start = graph.start();
    let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
    let mut seq: u64 = 0;
    queue.push(QueueEntry {
        penalty: 0.0,
        seq,
        node: start,
        route: Vec::new(),
        visited: HashSet::new(),
    });

    // Deepest frontier level, for the infeasibility diagnostic.
    let mut deepest = 0usize;

    while let Some(entry) = queue.pop() {
        if entry.node == start && entry.visited.contains(&start) {
            let mut nodes = entry.route;
            nodes.push(start);
            debug!(
                penalty = entry.penalty,
                states = nodes.len(),
                "closed route found"
            );
            return Ok(OptimalRoute {
                nodes,
                penalty: entry.penalty,
            });
        }

        if entry.visited.contains(&entry.node) {
            continue;
        }

        let mut visited = entry.visited;
        visited.insert(entry.node);
        let mut route = entry.route;
        route.push(entry.node);

        for transition in graph.transitions(entry.node) {
            let penalty = entry.penalty + transition.penalty;
            if !penalty.is_finite() {
                continue;
            }

            let mut candidate = route.clone();
            candidate.push(transition.target);
            if !route_is_feasible(graph, &candidate, constraints, memory_multiplier) {
                continue;
            }
            deepest = deepest.max(candidate.len());

            seq += 1;
            queue.push(QueueEntry {
                penalty,
                seq,
                node: transition.target,
                route: route.clone(),
                visited: visited.clone(),
            });
        }
    }

    // `deepest` counts [start, layer 0, …]; the layer that could not be
    // extended past sits at index deepest - 1.
    let stuck = graph
        .layers()
        .get(deepest.saturating_sub(1))
        .or_else(|| graph.layers().last())
        .map_or_else(|| "<none>".to_string(), |l| l.name.clone());
    Err(SearchError::Infeasible { layer: stuck })
}

/// Reject constraints that reference layers or devices the graph does
/// not know — they would otherwise silently make the search infeasible.
fn validate_constraints(graph: &CostGraph, constraints: &Constraints) -> SearchResult<()> {
    for (layer, device) in constraints
        .must_be_on_device
        .iter()
        .chain(&constraints.must_not_be_on_device)
    {
        if !graph.layers().iter().any(|l| &l.name == layer) {
            return Err(SearchError::UnknownConstraintLayer(layer.clone()));
        }
        if !graph.devices().iter().any(|d| &d.name == device) {
            return Err(SearchError::UnknownConstraintDevice(device.clone()));
        }
    }
    Ok(())
}
