//! `slice deploy` — roll out a configuration as a service pipeline.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use slice_core::{Configuration, SliceConfig};
use slicegrid_deploy::{CliFleet, DeployError, DeployOptions, PipelineDeployer};

pub async fn run(configuration_path: &Path, config_path: &Path) -> anyhow::Result<()> {
    let configuration = Configuration::load(configuration_path)
        .with_context(|| format!("reading {}", configuration_path.display()))?;
    let prefs = SliceConfig::from_file(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let opts = DeployOptions::from_config(&prefs);

    let staging = staging_dir()?;
    info!(
        project = %opts.project,
        blocks = configuration.blocks.len(),
        staging = %staging.display(),
        "deploying pipeline"
    );

    let deployer = PipelineDeployer::new(CliFleet::new(), opts);
    match deployer.deploy(&configuration, &staging).await {
        Ok(records) => {
            for record in &records {
                println!("✓ {} running on {}", record.name, record.node);
            }
            Ok(())
        }
        Err(DeployError::ServiceSpawn {
            service,
            reason,
            logs,
        }) => {
            eprintln!("Deploy failed: service {service} did not start ({reason})");
            if !logs.is_empty() {
                eprintln!("--- captured logs for {service} ---");
                eprintln!("{logs}");
            }
            anyhow::bail!("deployment aborted and torn down");
        }
        Err(e) => {
            eprintln!("Deploy failed: {e}");
            Err(e.into())
        }
    }
}

/// Scratch directory for image build contexts; lives under the system
/// temp dir, keyed by pid so concurrent invocations do not collide.
fn staging_dir() -> anyhow::Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("slicegrid-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
