pub mod artifacts;
pub mod cluster;
pub mod init;
pub mod run;
pub mod step;

use std::path::Path;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use stepgrid_control::{ClusterControl, HttpControlPlane, ProvisioningSettings};
use stepgrid_core::config::{ClusterDefaults, PollConfig};
use stepgrid_core::{ActionOnFailure, ClusterSpec, StepGridConfig, StepSpec, SubmitProfile};
use stepgrid_orchestrator::{Orchestrator, PollPolicy, TokioClock};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Loaded configuration plus the output choice, shared by every command.
pub struct Context {
    pub config: StepGridConfig,
    pub format: OutputFormat,
}

impl Context {
    pub fn load(
        config_path: Option<&Path>,
        endpoint: Option<String>,
        format: OutputFormat,
    ) -> anyhow::Result<Self> {
        let mut config = StepGridConfig::load(config_path)?;
        if let Some(endpoint) = endpoint {
            config.control_plane.endpoint = endpoint;
        }
        debug!(endpoint = %config.control_plane.endpoint, "configuration loaded");
        Ok(Self { config, format })
    }

    pub fn plane(&self) -> anyhow::Result<Arc<HttpControlPlane>> {
        Ok(Arc::new(HttpControlPlane::from_config(&self.config.control_plane)?))
    }

    pub fn cluster_control(&self) -> anyhow::Result<ClusterControl> {
        Ok(ClusterControl::new(
            self.plane()?,
            ProvisioningSettings::from(&self.config.cluster),
        ))
    }

    pub fn orchestrator(&self, profile: SubmitProfile) -> anyhow::Result<Orchestrator> {
        Ok(Orchestrator::new(
            self.cluster_control()?,
            profile,
            Arc::new(TokioClock),
        ))
    }

    /// Print `value` as JSON when requested, else the text rendering.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => print!("{}", text()),
        }
        Ok(())
    }
}

/// Cluster settings for creating a cluster; unset flags fall back to
/// the `[cluster]` section of the config.
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Cluster name
    #[arg(long)]
    pub name: Option<String>,
    /// Where the cluster writes its logs (s3://...)
    #[arg(long)]
    pub log_uri: Option<String>,
    #[arg(long)]
    pub release_label: Option<String>,
    #[arg(long)]
    pub instance_type: Option<String>,
    /// Number of CORE nodes
    #[arg(long)]
    pub core_count: Option<u32>,
    /// Key pair for SSH access to the nodes
    #[arg(long)]
    pub key_name: Option<String>,
}

impl ClusterArgs {
    pub fn to_spec(&self, defaults: &ClusterDefaults) -> anyhow::Result<ClusterSpec> {
        let name = self
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--name is required to create a cluster"))?;
        let log_uri = self
            .log_uri
            .clone()
            .or_else(|| defaults.log_uri.clone())
            .ok_or_else(|| anyhow::anyhow!("no log URI: pass --log-uri or set cluster.log_uri"))?;
        let key_name = self
            .key_name
            .clone()
            .or_else(|| defaults.key_name.clone())
            .ok_or_else(|| anyhow::anyhow!("no key pair: pass --key-name or set cluster.key_name"))?;

        Ok(ClusterSpec {
            name,
            log_uri,
            release_label: self
                .release_label
                .clone()
                .unwrap_or_else(|| defaults.release_label.clone()),
            instance_type: self
                .instance_type
                .clone()
                .unwrap_or_else(|| defaults.instance_type.clone()),
            core_count: self.core_count.unwrap_or(defaults.core_count),
            key_name,
        })
    }
}

/// Polling overrides; unset flags fall back to the `[poll]` section.
#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Wait between status queries ("30s", "500ms", "5m")
    #[arg(long)]
    pub interval: Option<String>,
    /// Status queries before giving up with TIMEOUT
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Enable backoff: double the wait after each query, up to this cap
    #[arg(long)]
    pub max_interval: Option<String>,
}

impl PollArgs {
    pub fn policy(&self, config: &PollConfig) -> anyhow::Result<PollPolicy> {
        let mut merged = config.clone();
        if let Some(interval) = &self.interval {
            merged.interval = interval.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            merged.max_attempts = max_attempts;
        }
        if let Some(max_interval) = &self.max_interval {
            merged.max_interval = Some(max_interval.clone());
        }
        PollPolicy::from_config(&merged)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailureAction {
    #[default]
    Continue,
    CancelAndWait,
    TerminateCluster,
}

impl From<FailureAction> for ActionOnFailure {
    fn from(action: FailureAction) -> Self {
        match action {
            FailureAction::Continue => ActionOnFailure::Continue,
            FailureAction::CancelAndWait => ActionOnFailure::CancelAndWait,
            FailureAction::TerminateCluster => ActionOnFailure::TerminateCluster,
        }
    }
}

/// Options shared by every submitted step.
#[derive(Args, Debug, Clone, Default)]
pub struct StepOptions {
    #[arg(long, default_value = "Run Custom Spark Job")]
    pub step_name: String,
    #[arg(long, value_enum, default_value_t = FailureAction::Continue)]
    pub action_on_failure: FailureAction,
    /// Entry class for jar artifacts (overrides submit.main_class)
    #[arg(long, conflicts_with = "no_class")]
    pub class: Option<String>,
    /// Submit without --class (for script artifacts)
    #[arg(long)]
    pub no_class: bool,
    /// Arguments passed to the job, after `--`
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl StepOptions {
    pub fn profile(&self, base: &SubmitProfile) -> SubmitProfile {
        let mut profile = base.clone();
        if self.no_class {
            profile.main_class = None;
        } else if let Some(class) = &self.class {
            profile.main_class = Some(class.clone());
        }
        profile
    }

    pub fn to_spec(&self, name: String, artifact: &str) -> StepSpec {
        StepSpec {
            name,
            action_on_failure: self.action_on_failure.into(),
            artifact: artifact.to_string(),
            args: self.args.clone(),
        }
    }
}

/// A shutdown signal that flips to `true` on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            let _ = tx.send(true);
        }
    });
    rx
}
