//! Pipeline deployer.
//!
//! Builds and pushes every image eagerly, then spawns the ring in
//! dependency order: pipeline-front first (forwarding to slice 0), then
//! each slice in increasing index order, the last one forwarding back
//! to the front. A service must stabilize before the next spawn, since
//! its environment wiring names a downstream service that is required
//! to already exist and be healthy. Everything created along the way is
//! tracked in a cleanup registry so any failure unwinds the whole
//! deployment.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use slice_core::{Configuration, SliceConfig};
use tracing::{info, warn};

use crate::error::{DeployError, DeployResult};
use crate::fleet::{ENV_FORWARD, ENV_INPUT_DIMS, ENV_SLICES, FleetApi, ServiceSpec};
use crate::image::{StagedImage, stage_front_image, stage_slice_image};
use crate::lifecycle::{ServicePhase, stabilize};

/// Deployment parameters, resolved from `slice.toml`.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub project: String,
    pub registry: String,
    pub runtime_image: String,
    pub network: String,
    pub publish_port: u16,
    pub poll_interval: Duration,
    pub startup_timeout: Duration,
}

impl DeployOptions {
    pub fn from_config(config: &SliceConfig) -> Self {
        let registry = config.registry.as_ref();
        let deploy = config.deploy.as_ref();
        DeployOptions {
            project: config.project.name.clone(),
            registry: registry
                .map(|r| r.prefix.clone())
                .unwrap_or_else(|| "registry.local:5000".to_string()),
            runtime_image: registry
                .and_then(|r| r.runtime_image.clone())
                .unwrap_or_else(|| "slicegrid/runtime:latest".to_string()),
            network: deploy
                .and_then(|d| d.network.clone())
                .unwrap_or_else(|| "slicegrid".to_string()),
            publish_port: deploy.and_then(|d| d.publish_port).unwrap_or(8765),
            poll_interval: config.poll_interval(),
            startup_timeout: config.startup_timeout(),
        }
    }
}

/// Deployment progress of one pipeline service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub image: String,
    pub node: String,
    pub phase: ServicePhase,
}

/// Everything created on the fleet so far, for unwinding on abort.
/// Targets are registered before the call that creates them is issued.
#[derive(Debug, Default)]
struct CleanupRegistry {
    services: Vec<String>,
    images: Vec<String>,
}

impl CleanupRegistry {
    fn register_image(&mut self, tag: &str) {
        self.images.push(tag.to_string());
    }

    fn register_service(&mut self, name: &str) {
        self.services.push(name.to_string());
    }

    /// Remove services then images, newest first. Failures are logged
    /// and skipped — teardown is best effort.
    async fn teardown<F: FleetApi>(&self, fleet: &F) {
        info!(
            services = self.services.len(),
            images = self.images.len(),
            "tearing down partially deployed pipeline"
        );
        for service in self.services.iter().rev() {
            if let Err(e) = fleet.remove_service(service).await {
                warn!(%service, error = %e, "teardown: service removal failed");
            }
        }
        for image in self.images.iter().rev() {
            if let Err(e) = fleet.remove_image(image).await {
                warn!(%image, error = %e, "teardown: image removal failed");
            }
        }
    }
}

/// Deploys one placement [`Configuration`] as a ring of services.
pub struct PipelineDeployer<F: FleetApi> {
    fleet: F,
    opts: DeployOptions,
}

impl<F: FleetApi> PipelineDeployer<F> {
    pub fn new(fleet: F, opts: DeployOptions) -> Self {
        Self { fleet, opts }
    }

    /// Build, push, and spawn the full pipeline. `staging` is the
    /// scratch directory build contexts are assembled under.
    ///
    /// On any failure, every service and image created so far is torn
    /// down before the error is returned.
    pub async fn deploy(
        &self,
        config: &Configuration,
        staging: &Path,
    ) -> DeployResult<Vec<ServiceRecord>> {
        if config.blocks.is_empty() {
            return Err(DeployError::EmptyPipeline);
        }

        let mut cleanup = CleanupRegistry::default();
        match self.deploy_inner(config, staging, &mut cleanup).await {
            Ok(records) => Ok(records),
            Err(e) => {
                cleanup.teardown(&self.fleet).await;
                Err(e)
            }
        }
    }

    async fn deploy_inner(
        &self,
        config: &Configuration,
        staging: &Path,
        cleanup: &mut CleanupRegistry,
    ) -> DeployResult<Vec<ServiceRecord>> {
        let front_name = format!("{}-front", self.opts.project);
        let slice_names: Vec<String> = config
            .blocks
            .iter()
            .map(|b| b.service_name(&self.opts.project))
            .collect();

        // ── Stage, build, push — eagerly, before any spawn ─────────
        let front_image =
            stage_front_image(staging, &self.opts.registry, &self.opts.project, &self.opts.runtime_image)?;
        let mut staged: Vec<(String, StagedImage)> = vec![(front_name.clone(), front_image)];
        for (block, name) in config.blocks.iter().zip(&slice_names) {
            let image = stage_slice_image(
                staging,
                &self.opts.registry,
                &self.opts.project,
                &self.opts.runtime_image,
                block,
            )?;
            staged.push((name.clone(), image));
        }

        let mut records: Vec<ServiceRecord> = Vec::with_capacity(staged.len());
        for (service, image) in &staged {
            cleanup.register_image(&image.tag);
            self.fleet
                .build_image(&image.context, &image.tag)
                .await
                .map_err(|e| DeployError::BuildOrPush {
                    image: image.tag.clone(),
                    reason: e.to_string(),
                })?;
            self.fleet
                .push_image(&image.tag)
                .await
                .map_err(|e| DeployError::BuildOrPush {
                    image: image.tag.clone(),
                    reason: e.to_string(),
                })?;
            info!(%service, tag = %image.tag, "image built and pushed");

            let node = match records.len() {
                0 => config.source_device.name.clone(),
                i => config.blocks[i - 1].device.name.clone(),
            };
            records.push(ServiceRecord {
                name: service.clone(),
                image: image.tag.clone(),
                node,
                phase: ServicePhase::Pushed,
            });
        }

        // ── Spawn the ring in dependency order ─────────────────────
        let specs = self.service_specs(config, &front_name, &slice_names, &records);
        for (index, spec) in specs.iter().enumerate() {
            cleanup.register_service(&spec.name);
            self.fleet
                .create_service(spec)
                .await
                .map_err(|e| DeployError::ServiceSpawn {
                    service: spec.name.clone(),
                    reason: format!("create failed: {e}"),
                    logs: String::new(),
                })?;
            records[index].phase = ServicePhase::SpawnRequested;
            info!(
                service = %spec.name,
                node = %spec.node,
                forward = spec.forward_target().unwrap_or("-"),
                "service spawn requested"
            );

            stabilize(
                &self.fleet,
                &spec.name,
                self.opts.poll_interval,
                self.opts.startup_timeout,
            )
            .await?;
            records[index].phase = ServicePhase::Running;
            info!(service = %spec.name, "service running");
        }

        info!(
            services = records.len(),
            project = %self.opts.project,
            "pipeline deployed"
        );
        Ok(records)
    }

    /// Service descriptors in spawn order: front, then each slice.
    fn service_specs(
        &self,
        config: &Configuration,
        front_name: &str,
        slice_names: &[String],
        records: &[ServiceRecord],
    ) -> Vec<ServiceSpec> {
        let input_dims = config
            .input_shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut front_env = BTreeMap::new();
        front_env.insert(ENV_FORWARD.to_string(), slice_names[0].clone());
        front_env.insert(ENV_SLICES.to_string(), slice_names.join(","));
        front_env.insert(ENV_INPUT_DIMS.to_string(), input_dims);

        let mut specs = vec![ServiceSpec {
            name: front_name.to_string(),
            image: records[0].image.clone(),
            node: config.source_device.name.clone(),
            network: self.opts.network.clone(),
            env: front_env,
            publish_port: Some(self.opts.publish_port),
        }];

        for (i, block) in config.blocks.iter().enumerate() {
            let forward = slice_names
                .get(i + 1)
                .cloned()
                .unwrap_or_else(|| front_name.to_string());
            let mut env = BTreeMap::new();
            env.insert(ENV_FORWARD.to_string(), forward);
            specs.push(ServiceSpec {
                name: slice_names[i].clone(),
                image: records[i + 1].image.clone(),
                node: block.device.name.clone(),
                network: self.opts.network.clone(),
                env,
                publish_port: None,
            });
        }
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::TaskState;
    use slice_core::{Constraints, Device, Layer, LayerModel, SliceBlock, SliceModel};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted in-memory fleet. Records every call; task-state polls
    /// consume per-service scripts, defaulting to a running task.
    #[derive(Default)]
    struct FakeFleet {
        calls: Mutex<Vec<String>>,
        specs: Mutex<Vec<ServiceSpec>>,
        task_scripts: Mutex<HashMap<String, VecDeque<Vec<TaskState>>>>,
        fail_build_for: Option<String>,
        fail_push_for: Option<String>,
        logs: String,
    }

    impl FakeFleet {
        fn script_tasks(&self, service: &str, polls: Vec<Vec<TaskState>>) {
            self.task_scripts
                .lock()
                .unwrap()
                .insert(service.to_string(), polls.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls_of(&self, prefix: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with(prefix))
                .collect()
        }
    }

    impl FleetApi for FakeFleet {
        async fn build_image(&self, _context: &Path, tag: &str) -> DeployResult<()> {
            self.record(format!("build:{tag}"));
            if let Some(needle) = &self.fail_build_for {
                if tag.contains(needle.as_str()) {
                    return Err(DeployError::Fleet("no space left on device".to_string()));
                }
            }
            Ok(())
        }

        async fn push_image(&self, tag: &str) -> DeployResult<()> {
            self.record(format!("push:{tag}"));
            if let Some(needle) = &self.fail_push_for {
                if tag.contains(needle.as_str()) {
                    return Err(DeployError::Fleet("registry unreachable".to_string()));
                }
            }
            Ok(())
        }

        async fn create_service(&self, spec: &ServiceSpec) -> DeployResult<()> {
            self.record(format!("create:{}", spec.name));
            self.specs.lock().unwrap().push(spec.clone());
            Ok(())
        }

        async fn service_tasks(&self, name: &str) -> DeployResult<Vec<TaskState>> {
            self.record(format!("tasks:{name}"));
            let mut scripts = self.task_scripts.lock().unwrap();
            match scripts.get_mut(name).and_then(|q| q.pop_front()) {
                Some(states) => Ok(states),
                None => Ok(vec![TaskState::Running]),
            }
        }

        async fn service_logs(&self, name: &str) -> DeployResult<String> {
            self.record(format!("logs:{name}"));
            Ok(self.logs.clone())
        }

        async fn remove_service(&self, name: &str) -> DeployResult<()> {
            self.record(format!("rm-service:{name}"));
            Ok(())
        }

        async fn remove_image(&self, tag: &str) -> DeployResult<()> {
            self.record(format!("rm-image:{tag}"));
            Ok(())
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

    fn device(name: &str) -> Device {
        Device {
            name: name.to_string(),
            free_memory: 8_000_000,
        }
    }

    fn model(dir: &Path, name: &str, input: &[u64], output: &[u64]) -> LayerModel {
        let artifact = dir.join(format!("{name}.bin"));
        std::fs::write(&artifact, name.as_bytes()).unwrap();
        LayerModel {
            name: name.to_string(),
            artifact,
            input_shape: input.to_vec(),
            output_shape: output.to_vec(),
        }
    }

    /// Two blocks: layers 0-1 on worker-b, layer 2 on worker-a (source).
    fn two_block_config(dir: &Path) -> Configuration {
        let m0 = model(dir, "layer_0", &[28, 28], &[14, 14]);
        let m1 = model(dir, "layer_1", &[14, 14], &[10]);
        let m2 = model(dir, "layer_2", &[10], &[10]);
        Configuration {
            layers: vec![layer("layer_0"), layer("layer_1"), layer("layer_2")],
            blocks: vec![
                SliceBlock {
                    layers: vec![layer("layer_0"), layer("layer_1")],
                    device: device("worker-b"),
                    start: 0,
                    end: 2,
                    model: SliceModel::compose(&[m0, m1]).unwrap(),
                },
                SliceBlock {
                    layers: vec![layer("layer_2")],
                    device: device("worker-a"),
                    start: 2,
                    end: 3,
                    model: SliceModel::compose(&[m2]).unwrap(),
                },
            ],
            devices: vec![device("worker-a"), device("worker-b")],
            constraints: Constraints::default(),
            source_device: device("worker-a"),
            input_shape: vec![28, 28, 1],
            memory_multiplier: 0.8,
            penalty: 0.042,
            jumps: 2,
        }
    }

    fn test_opts() -> DeployOptions {
        DeployOptions {
            project: "demo".to_string(),
            registry: "registry.local:5000".to_string(),
            runtime_image: "slicegrid/runtime:latest".to_string(),
            network: "slicegrid".to_string(),
            publish_port: 8765,
            poll_interval: Duration::from_millis(1),
            startup_timeout: Duration::from_millis(250),
        }
    }

    #[tokio::test]
    async fn spawn_order_is_front_then_slices() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let deployer = PipelineDeployer::new(FakeFleet::default(), test_opts());

        let records = deployer.deploy(&config, &dir.path().join("staging")).await.unwrap();

        let creates = deployer.fleet.calls_of("create:");
        assert_eq!(
            creates,
            vec![
                "create:demo-front",
                "create:demo-slice-0-2",
                "create:demo-slice-2-3",
            ]
        );
        assert!(records.iter().all(|r| r.phase == ServicePhase::Running));
    }

    #[tokio::test]
    async fn forward_chain_closes_the_ring() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let deployer = PipelineDeployer::new(FakeFleet::default(), test_opts());

        deployer.deploy(&config, &dir.path().join("staging")).await.unwrap();

        let specs = deployer.fleet.specs.lock().unwrap().clone();
        assert_eq!(specs[0].forward_target(), Some("demo-slice-0-2"));
        assert_eq!(specs[1].forward_target(), Some("demo-slice-2-3"));
        assert_eq!(specs[2].forward_target(), Some("demo-front"));

        // Front carries the slice list, the input dims, and the only
        // published port; slices carry none of those.
        assert_eq!(
            specs[0].env.get(ENV_SLICES).map(String::as_str),
            Some("demo-slice-0-2,demo-slice-2-3")
        );
        assert_eq!(
            specs[0].env.get(ENV_INPUT_DIMS).map(String::as_str),
            Some("28,28,1")
        );
        assert_eq!(specs[0].publish_port, Some(8765));
        for spec in &specs[1..] {
            assert!(!spec.env.contains_key(ENV_SLICES));
            assert_eq!(spec.publish_port, None);
        }
    }

    #[tokio::test]
    async fn services_are_pinned_to_their_devices() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let deployer = PipelineDeployer::new(FakeFleet::default(), test_opts());

        deployer.deploy(&config, &dir.path().join("staging")).await.unwrap();

        let specs = deployer.fleet.specs.lock().unwrap().clone();
        assert_eq!(specs[0].node, "worker-a"); // front on the source
        assert_eq!(specs[1].node, "worker-b");
        assert_eq!(specs[2].node, "worker-a");
    }

    #[tokio::test]
    async fn all_images_pushed_before_first_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let deployer = PipelineDeployer::new(FakeFleet::default(), test_opts());

        deployer.deploy(&config, &dir.path().join("staging")).await.unwrap();

        let calls = deployer.fleet.calls();
        let first_create = calls.iter().position(|c| c.starts_with("create:")).unwrap();
        let pushes = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.starts_with("push:"))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(pushes.len(), 3);
        assert!(pushes.iter().all(|&i| i < first_create));
    }

    #[tokio::test]
    async fn service_stabilizes_before_next_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let fleet = FakeFleet::default();
        // Front needs two polls before it runs.
        fleet.script_tasks(
            "demo-front",
            vec![vec![TaskState::Pending], vec![TaskState::Running]],
        );
        let deployer = PipelineDeployer::new(fleet, test_opts());

        deployer.deploy(&config, &dir.path().join("staging")).await.unwrap();

        let calls = deployer.fleet.calls();
        let create_slice0 = calls.iter().position(|c| c == "create:demo-slice-0-2").unwrap();
        let front_polls = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| *c == "tasks:demo-front")
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(front_polls.len(), 2);
        assert!(front_polls.iter().all(|&i| i < create_slice0));
    }

    #[tokio::test]
    async fn failed_task_aborts_and_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let fleet = FakeFleet {
            logs: "OOM killed\n".to_string(),
            ..FakeFleet::default()
        };
        // Scenario: pending, pending, then a terminal failure.
        fleet.script_tasks(
            "demo-slice-0-2",
            vec![
                vec![TaskState::Pending],
                vec![TaskState::Pending],
                vec![TaskState::Failed],
            ],
        );
        let deployer = PipelineDeployer::new(fleet, test_opts());

        let err = deployer
            .deploy(&config, &dir.path().join("staging"))
            .await
            .unwrap_err();

        match err {
            DeployError::ServiceSpawn {
                service,
                reason,
                logs,
            } => {
                assert_eq!(service, "demo-slice-0-2");
                assert!(reason.contains("Failed"), "reason: {reason}");
                assert_eq!(logs, "OOM killed\n");
            }
            other => panic!("expected ServiceSpawn, got {other}"),
        }

        // The failure blocks all subsequent spawns.
        assert!(!deployer.fleet.calls().contains(&"create:demo-slice-2-3".to_string()));

        // Teardown removes spawned services newest-first, then images.
        let removals = deployer.fleet.calls_of("rm-service:");
        assert_eq!(removals, vec!["rm-service:demo-slice-0-2", "rm-service:demo-front"]);
        assert_eq!(deployer.fleet.calls_of("rm-image:").len(), 3);
    }

    #[tokio::test]
    async fn startup_timeout_fails_the_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let fleet = FakeFleet::default();
        // Never leaves pending; the deadline has to fire.
        fleet.script_tasks("demo-front", vec![vec![TaskState::Pending]; 1_000]);
        let deployer = PipelineDeployer::new(fleet, test_opts());

        let err = deployer
            .deploy(&config, &dir.path().join("staging"))
            .await
            .unwrap_err();
        match err {
            DeployError::ServiceSpawn { service, reason, .. } => {
                assert_eq!(service, "demo-front");
                assert!(reason.contains("timeout"), "reason: {reason}");
            }
            other => panic!("expected ServiceSpawn, got {other}"),
        }
        assert!(deployer.fleet.calls_of("create:").len() == 1);
    }

    #[tokio::test]
    async fn build_failure_aborts_before_any_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let fleet = FakeFleet {
            fail_build_for: Some("demo-slice-0-2".to_string()),
            ..FakeFleet::default()
        };
        let deployer = PipelineDeployer::new(fleet, test_opts());

        let err = deployer
            .deploy(&config, &dir.path().join("staging"))
            .await
            .unwrap_err();
        match err {
            DeployError::BuildOrPush { image, reason } => {
                assert!(image.contains("demo-slice-0-2"));
                assert!(reason.contains("no space left"));
            }
            other => panic!("expected BuildOrPush, got {other}"),
        }
        assert!(deployer.fleet.calls_of("create:").is_empty());
    }

    #[tokio::test]
    async fn push_failure_aborts_before_any_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = two_block_config(dir.path());
        let fleet = FakeFleet {
            fail_push_for: Some("demo-front".to_string()),
            ..FakeFleet::default()
        };
        let deployer = PipelineDeployer::new(fleet, test_opts());

        let err = deployer
            .deploy(&config, &dir.path().join("staging"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::BuildOrPush { .. }));
        assert!(deployer.fleet.calls_of("create:").is_empty());
    }

    #[tokio::test]
    async fn empty_configuration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = two_block_config(dir.path());
        config.blocks.clear();
        let deployer = PipelineDeployer::new(FakeFleet::default(), test_opts());

        let err = deployer
            .deploy(&config, &dir.path().join("staging"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::EmptyPipeline));
    }

    #[test]
    fn options_resolve_from_slice_toml() {
        let config: SliceConfig = toml::from_str(
            r#"
[project]
name = "mnist"

[registry]
prefix = "reg.example.com"
runtime_image = "slicegrid/runtime:1.2"

[deploy]
network = "inference"
publish_port = 9000
poll_interval = "1s"
startup_timeout = "30s"
"#,
        )
        .unwrap();
        let opts = DeployOptions::from_config(&config);
        assert_eq!(opts.project, "mnist");
        assert_eq!(opts.registry, "reg.example.com");
        assert_eq!(opts.runtime_image, "slicegrid/runtime:1.2");
        assert_eq!(opts.network, "inference");
        assert_eq!(opts.publish_port, 9000);
        assert_eq!(opts.poll_interval, Duration::from_secs(1));
        assert_eq!(opts.startup_timeout, Duration::from_secs(30));
    }
}
