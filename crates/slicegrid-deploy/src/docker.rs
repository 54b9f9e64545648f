//! Container-CLI adapter for [`FleetApi`].
//!
//! Drives the fleet's orchestration plane through the container CLI
//! (`docker` by default, overridable via `$SLICEGRID_DOCKER_PATH`):
//! image build/push, Swarm-mode service create/remove, task-state
//! polling via `service ps`, log capture via `service logs`.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{DeployError, DeployResult};
use crate::fleet::{FleetApi, ServiceSpec, TaskState};

pub struct CliFleet {
    binary: PathBuf,
}

impl CliFleet {
    /// Use `$SLICEGRID_DOCKER_PATH` if set, otherwise `docker` on `$PATH`.
    pub fn new() -> Self {
        let binary = std::env::var("SLICEGRID_DOCKER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("docker"));
        Self { binary }
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Run one CLI invocation; non-zero exit becomes a fleet error
    /// carrying the captured stderr.
    async fn run(&self, args: &[String]) -> DeployResult<String> {
        debug!(binary = %self.binary.display(), ?args, "invoking container cli");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| DeployError::Fleet(format!("spawn {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::Fleet(format!(
                "`{} {}` exited with {}: {}",
                self.binary.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for CliFleet {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `service create` from a [`ServiceSpec`]: one replica,
/// restart policy "none", hard node affinity, overlay network.
fn service_create_args(spec: &ServiceSpec) -> Vec<String> {
    let mut args: Vec<String> = [
        "service",
        "create",
        "--detach",
        "--name",
        spec.name.as_str(),
        "--replicas",
        "1",
        "--restart-condition",
        "none",
        "--network",
        spec.network.as_str(),
        "--constraint",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("node.hostname=={}", spec.node));

    for (key, value) in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    if let Some(port) = spec.publish_port {
        args.push("--publish".to_string());
        args.push(format!("{port}:{port}"));
    }
    args.push(spec.image.clone());
    args
}

/// Parse `service ps --format '{{json .}}'` output: one JSON object per
/// line, task state in `CurrentState`. Unknown states are skipped with
/// a warning rather than failing the poll.
fn parse_task_lines(stdout: &str) -> Vec<TaskState> {
    let mut states = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, line, "unparseable task line from service ps");
                continue;
            }
        };
        let Some(current) = value.get("CurrentState").and_then(|v| v.as_str()) else {
            warn!(line, "task line missing CurrentState");
            continue;
        };
        match TaskState::parse(current) {
            Some(state) => states.push(state),
            None => warn!(state = current, "unknown task state"),
        }
    }
    states
}

impl FleetApi for CliFleet {
    async fn build_image(&self, context: &Path, tag: &str) -> DeployResult<()> {
        self.run(&[
            "build".to_string(),
            "--tag".to_string(),
            tag.to_string(),
            context.display().to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn push_image(&self, tag: &str) -> DeployResult<()> {
        self.run(&["push".to_string(), tag.to_string()]).await?;
        Ok(())
    }

    async fn create_service(&self, spec: &ServiceSpec) -> DeployResult<()> {
        self.run(&service_create_args(spec)).await?;
        Ok(())
    }

    async fn service_tasks(&self, name: &str) -> DeployResult<Vec<TaskState>> {
        let stdout = self
            .run(&[
                "service".to_string(),
                "ps".to_string(),
                name.to_string(),
                "--format".to_string(),
                "{{json .}}".to_string(),
                "--no-trunc".to_string(),
            ])
            .await?;
        Ok(parse_task_lines(&stdout))
    }

    async fn service_logs(&self, name: &str) -> DeployResult<String> {
        self.run(&[
            "service".to_string(),
            "logs".to_string(),
            "--raw".to_string(),
            "--tail".to_string(),
            "200".to_string(),
            name.to_string(),
        ])
        .await
    }

    async fn remove_service(&self, name: &str) -> DeployResult<()> {
        self.run(&["service".to_string(), "rm".to_string(), name.to_string()])
            .await?;
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> DeployResult<()> {
        self.run(&["image".to_string(), "rm".to_string(), tag.to_string()])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{ENV_FORWARD, ENV_INPUT_DIMS, ENV_SLICES};
    use std::collections::BTreeMap;

    fn front_spec() -> ServiceSpec {
        let mut env = BTreeMap::new();
        env.insert(ENV_FORWARD.to_string(), "demo-slice-0-2".to_string());
        env.insert(
            ENV_SLICES.to_string(),
            "demo-slice-0-2,demo-slice-2-3".to_string(),
        );
        env.insert(ENV_INPUT_DIMS.to_string(), "28,28,1".to_string());
        ServiceSpec {
            name: "demo-front".to_string(),
            image: "registry/demo-front:abc123".to_string(),
            node: "worker-a".to_string(),
            network: "slicegrid".to_string(),
            env,
            publish_port: Some(8765),
        }
    }

    #[test]
    fn create_args_pin_one_replica_no_restart() {
        let args = service_create_args(&front_spec());
        let joined = args.join(" ");
        assert!(joined.contains("--replicas 1"));
        assert!(joined.contains("--restart-condition none"));
        assert!(joined.contains("--constraint node.hostname==worker-a"));
        assert!(joined.contains("--network slicegrid"));
        assert!(joined.contains("--publish 8765:8765"));
        assert!(joined.contains("--env FORWARD=demo-slice-0-2"));
        assert!(joined.contains("--env INPUTDIMS=28,28,1"));
        // Image reference is the trailing positional argument.
        assert_eq!(args.last().unwrap(), "registry/demo-front:abc123");
    }

    #[test]
    fn create_args_omit_publish_without_port() {
        let mut spec = front_spec();
        spec.publish_port = None;
        let args = service_create_args(&spec);
        assert!(!args.iter().any(|a| a == "--publish"));
    }

    #[test]
    fn parse_task_lines_extracts_states() {
        let stdout = concat!(
            "{\"ID\":\"abc\",\"CurrentState\":\"Running 14 seconds ago\",\"DesiredState\":\"Running\"}\n",
            "{\"ID\":\"def\",\"CurrentState\":\"Pending 2 seconds ago\",\"DesiredState\":\"Running\"}\n",
        );
        assert_eq!(
            parse_task_lines(stdout),
            vec![TaskState::Running, TaskState::Pending]
        );
    }

    #[test]
    fn parse_task_lines_skips_garbage() {
        let stdout = "not-json\n{\"CurrentState\":\"sideways\"}\n{\"NoState\":true}\n";
        assert!(parse_task_lines(stdout).is_empty());
    }

    #[test]
    fn binary_override_from_env_shape() {
        let fleet = CliFleet::with_binary(PathBuf::from("/usr/local/bin/podman"));
        assert_eq!(fleet.binary, PathBuf::from("/usr/local/bin/podman"));
    }
}
