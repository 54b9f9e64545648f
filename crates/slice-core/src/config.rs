//! slice.toml — deployment preferences.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceConfig {
    pub project: ProjectConfig,
    pub registry: Option<RegistryConfig>,
    pub search: Option<SearchConfig>,
    pub deploy: Option<DeployConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry prefix image tags are pushed under, e.g. `registry.local:5000`.
    pub prefix: String,
    /// Base image the slice services are built from.
    pub runtime_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Fraction of each device's free memory the search may budget.
    pub memory_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Overlay network every pipeline service attaches to.
    pub network: Option<String>,
    /// Externally published port of the pipeline-front service.
    pub publish_port: Option<u16>,
    /// Interval between service-status polls (e.g. "2s").
    pub poll_interval: Option<String>,
    /// Startup deadline per service (e.g. "120s").
    pub startup_timeout: Option<String>,
}

impl SliceConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a minimal slice.toml for a new project.
    pub fn scaffold(name: &str) -> Self {
        SliceConfig {
            project: ProjectConfig {
                name: name.to_string(),
                description: None,
            },
            registry: Some(RegistryConfig {
                prefix: "registry.local:5000".to_string(),
                runtime_image: Some("slicegrid/runtime:latest".to_string()),
            }),
            search: Some(SearchConfig {
                memory_multiplier: Some(0.8),
            }),
            deploy: Some(DeployConfig {
                network: Some("slicegrid".to_string()),
                publish_port: Some(8765),
                poll_interval: Some("2s".to_string()),
                startup_timeout: Some("120s".to_string()),
            }),
        }
    }

    pub fn memory_multiplier(&self) -> f64 {
        self.search
            .as_ref()
            .and_then(|s| s.memory_multiplier)
            .unwrap_or(0.8)
    }

    pub fn poll_interval(&self) -> Duration {
        self.deploy
            .as_ref()
            .and_then(|d| d.poll_interval.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(2))
    }

    pub fn startup_timeout(&self) -> Duration {
        self.deploy
            .as_ref()
            .and_then(|d| d.startup_timeout.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(120))
    }
}

/// Parse a duration string like "5s", "500ms", "2m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_roundtrips() {
        let config = SliceConfig::scaffold("demo");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("demo"));
        let back: SliceConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.project.name, "demo");
        assert_eq!(back.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn parse_minimal() {
        let toml_str = r#"
[project]
name = "mnist-pipeline"
"#;
        let config: SliceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.project.name, "mnist-pipeline");
        // Defaults apply when sections are absent.
        assert!((config.memory_multiplier() - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.startup_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("nope"), None);
    }
}
