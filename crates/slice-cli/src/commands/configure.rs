//! `slice configure` — run the placement search and write the
//! configuration artifact.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use slice_core::{BenchmarkReport, Configuration, Constraints, LayerModel, SliceConfig};
use slicegrid_placement::{GraphBuilder, find_optimal_route, generate_blocks, jump_count};

pub fn run(
    report_path: &Path,
    models_path: &Path,
    source: &str,
    input_bytes: u64,
    constraints: Option<&str>,
    config_path: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let report = BenchmarkReport::from_file(report_path)
        .with_context(|| format!("reading benchmark report {}", report_path.display()))?;
    let models = LayerModel::load_manifest(models_path)
        .with_context(|| format!("reading layer manifest {}", models_path.display()))?;
    anyhow::ensure!(!models.is_empty(), "layer manifest is empty");
    let constraints = match constraints {
        Some(input) => Constraints::parse(input)?,
        None => Constraints::default(),
    };
    let prefs = SliceConfig::from_file(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let memory_multiplier = prefs.memory_multiplier();

    let names: Vec<String> = models.iter().map(|m| m.name.clone()).collect();
    let layers = report.resolve_layers(source, &names)?;

    info!(
        layers = layers.len(),
        devices = report.devices().len(),
        source,
        "building cost graph"
    );
    let graph = GraphBuilder::new(&report).build(layers, source, input_bytes)?;

    info!(memory_multiplier, "searching for the optimal placement");
    let route = find_optimal_route(&graph, &constraints, memory_multiplier)?;
    let blocks = generate_blocks(&graph, &route, &models)?;
    let jumps = jump_count(&graph, &route);

    let devices = graph.devices().to_vec();
    let source_device = devices[graph.source_device()].clone();
    let configuration = Configuration {
        layers: graph.layers().to_vec(),
        input_shape: blocks[0].model.input_shape.clone(),
        blocks,
        devices,
        constraints,
        source_device,
        memory_multiplier,
        penalty: route.penalty,
        jumps,
    };

    configuration
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("{}", configuration.summary_table());
    println!("Penalty: {:.6}s over {} device handoffs", configuration.penalty, jumps);
    println!("✓ Wrote {}", output.display());
    Ok(())
}
