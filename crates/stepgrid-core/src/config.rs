//! stepgrid.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepGridConfig {
    pub control_plane: ControlPlaneConfig,
    pub cluster: ClusterDefaults,
    pub submit: SubmitProfile,
    pub poll: PollConfig,
}

/// Where and how to reach the remote control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub request_timeout: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8480".to_string(),
            api_key: None,
            request_timeout: "30s".to_string(),
        }
    }
}

/// Defaults applied when creating clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterDefaults {
    pub log_uri: Option<String>,
    pub release_label: String,
    pub instance_type: String,
    pub core_count: u32,
    pub key_name: Option<String>,
    /// Role assumed by the cluster's nodes.
    pub job_flow_role: String,
    /// Role assumed by the control plane on the caller's behalf.
    pub service_role: String,
    /// Interpreter exported as `PYSPARK_PYTHON` on every node.
    pub pyspark_python: String,
    pub applications: Vec<String>,
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self {
            log_uri: None,
            release_label: "emr-6.10.0".to_string(),
            instance_type: "m5.xlarge".to_string(),
            core_count: 2,
            key_name: None,
            job_flow_role: "EMR_for_EC2_role".to_string(),
            service_role: "EMR_ROLE".to_string(),
            pyspark_python: "/usr/bin/python3".to_string(),
            applications: vec!["Hadoop".to_string(), "Spark".to_string()],
        }
    }
}

/// Resource-tuning profile baked into every submitted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitProfile {
    /// Generic command runner the step executes.
    pub runner_jar: String,
    pub command: String,
    /// Entry class for jar artifacts; unset for scripts.
    pub main_class: Option<String>,
    pub master: String,
    pub deploy_mode: String,
    pub driver_memory: String,
    pub driver_cores: u32,
    pub num_executors: u32,
    pub executor_memory: String,
    pub executor_cores: u32,
    /// Extra `--conf` settings as `key=value`, emitted in the order given.
    pub conf: Vec<String>,
}

impl Default for SubmitProfile {
    fn default() -> Self {
        let conf = [
            "spark.memory.fraction=0.4",
            "spark.shuffle.memoryFraction=0.5",
            "spark.shuffle.file.buffer=64k",
        ]
        .map(String::from)
        .to_vec();

        Self {
            runner_jar: "command-runner.jar".to_string(),
            command: "spark-submit".to_string(),
            main_class: Some("com.Join".to_string()),
            master: "yarn".to_string(),
            deploy_mode: "cluster".to_string(),
            driver_memory: "5g".to_string(),
            driver_cores: 4,
            num_executors: 4,
            executor_memory: "4g".to_string(),
            executor_cores: 2,
            conf,
        }
    }
}

/// Step polling budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval: String,
    pub max_attempts: u32,
    /// When set, the wait doubles after every non-terminal poll up to this cap.
    pub max_interval: Option<String>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            max_attempts: 60,
            max_interval: None,
        }
    }
}

impl StepGridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StepGridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, else `./stepgrid.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let local = Path::new("stepgrid.toml");
                if local.exists() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a starter stepgrid.toml.
    pub fn scaffold(endpoint: &str, log_uri: &str, key_name: &str) -> Self {
        StepGridConfig {
            control_plane: ControlPlaneConfig {
                endpoint: endpoint.to_string(),
                ..ControlPlaneConfig::default()
            },
            cluster: ClusterDefaults {
                log_uri: Some(log_uri.to_string()),
                key_name: Some(key_name.to_string()),
                ..ClusterDefaults::default()
            },
            submit: SubmitProfile::default(),
            poll: PollConfig::default(),
        }
    }
}

impl ControlPlaneConfig {
    pub fn request_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.request_timeout)
            .ok_or_else(|| anyhow::anyhow!("invalid request_timeout: {}", self.request_timeout))
    }
}

/// Parse a duration string like "30s", "500ms", "5m" or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
