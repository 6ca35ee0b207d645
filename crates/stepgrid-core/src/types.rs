//! Shared types used across StepGrid crates.
//!
//! Everything the control plane reports is modelled as an explicit record.
//! Fields the remote side may legitimately omit are `Option`s, so callers
//! deal with missing data at the type level instead of by lookup.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque cluster identifier assigned by the control plane.
pub type ClusterId = String;

/// Opaque step identifier assigned by the control plane.
pub type StepId = String;

/// Opaque instance group identifier assigned by the control plane.
pub type InstanceGroupId = String;

// ── Cluster ───────────────────────────────────────────────────────

/// Caller-supplied parameters for a new cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    /// Object-store prefix receiving cluster and step logs.
    pub log_uri: String,
    /// Software release label, e.g. "emr-6.10.0".
    pub release_label: String,
    pub instance_type: String,
    /// Number of CORE nodes. The MASTER group always has exactly one node.
    pub core_count: u32,
    /// SSH key pair reference installed on every node.
    pub key_name: String,
}

/// Handle to a cluster created (or adopted) by this process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterHandle {
    pub cluster_id: ClusterId,
}

impl ClusterHandle {
    pub fn new(cluster_id: impl Into<ClusterId>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }
}

impl fmt::Display for ClusterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cluster_id)
    }
}

/// Lifecycle state of a cluster as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    Starting,
    Bootstrapping,
    Running,
    Waiting,
    Terminating,
    Terminated,
    TerminatedWithErrors,
}

impl ClusterState {
    /// The cluster is gone; every further operation on its handle is invalid.
    pub fn is_terminated(self) -> bool {
        matches!(
            self,
            ClusterState::Terminated | ClusterState::TerminatedWithErrors
        )
    }

    /// Whether the cluster still accepts new steps.
    pub fn accepts_steps(self) -> bool {
        !matches!(
            self,
            ClusterState::Terminating
                | ClusterState::Terminated
                | ClusterState::TerminatedWithErrors
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ClusterState::Starting => "STARTING",
            ClusterState::Bootstrapping => "BOOTSTRAPPING",
            ClusterState::Running => "RUNNING",
            ClusterState::Waiting => "WAITING",
            ClusterState::Terminating => "TERMINATING",
            ClusterState::Terminated => "TERMINATED",
            ClusterState::TerminatedWithErrors => "TERMINATED_WITH_ERRORS",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time snapshot of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub id: ClusterId,
    pub name: String,
    pub state: ClusterState,
    /// Public DNS name of the master node, once assigned.
    #[serde(default)]
    pub public_endpoint: Option<String>,
    #[serde(default)]
    pub log_uri: Option<String>,
    #[serde(default)]
    pub applications: Vec<String>,
}

// ── Instance groups ───────────────────────────────────────────────

/// Role of an instance group within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceRole {
    Master,
    Core,
    Task,
}

impl InstanceRole {
    pub fn label(self) -> &'static str {
        match self {
            InstanceRole::Master => "MASTER",
            InstanceRole::Core => "CORE",
            InstanceRole::Task => "TASK",
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A partition of a cluster's nodes sharing one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub id: InstanceGroupId,
    pub role: InstanceRole,
    pub instance_type: String,
    /// Count the group was last asked to run.
    pub requested_count: u32,
    /// Count currently running (lags `requested_count` during a resize).
    pub running_count: u32,
}

// ── Steps ─────────────────────────────────────────────────────────

/// What the cluster does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOnFailure {
    #[default]
    Continue,
    CancelAndWait,
    TerminateCluster,
}

/// One unit of work to submit to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(default)]
    pub action_on_failure: ActionOnFailure,
    /// Location of the executable (jar or script), e.g. `s3://bucket/job.jar`.
    pub artifact: String,
    /// Arguments passed to the executable after the artifact location.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Handle to a submitted step. Only valid against its owning cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepHandle {
    pub step_id: StepId,
    pub cluster_id: ClusterId,
}

impl fmt::Display for StepHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster_id, self.step_id)
    }
}

/// Status of a step.
///
/// `Completed`, `Failed` and `Cancelled` are terminal on the server.
/// `Timeout` and `Aborted` are synthesized on the client: the polling
/// budget ran out, or the caller cancelled polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    CancelPending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Aborted,
}

impl StepStatus {
    /// Terminal as reported by the control plane.
    pub fn is_server_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Cancelled
        )
    }

    /// Any state after which polling stops.
    pub fn is_terminal(self) -> bool {
        self.is_server_terminal() || matches!(self, StepStatus::Timeout | StepStatus::Aborted)
    }

    pub fn label(self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::CancelPending => "CANCEL_PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Cancelled => "CANCELLED",
            StepStatus::Timeout => "TIMEOUT",
            StepStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Timestamps the control plane attaches to a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTimeline {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Raw status payload for one step, as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    pub id: StepId,
    #[serde(default)]
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub timeline: StepTimeline,
    /// Where the step's stdout/stderr end up.
    #[serde(default)]
    pub log_location: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

// ── Outcomes ──────────────────────────────────────────────────────

/// A telemetry value that the control plane may not have reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reported<T> {
    Available(T),
    Unavailable,
}

impl<T> Reported<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Reported::Available(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Reported::Available(v) => Some(v),
            Reported::Unavailable => None,
        }
    }
}

impl<T> From<Option<T>> for Reported<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Reported::Unavailable, Reported::Available)
    }
}

impl<T: fmt::Display> fmt::Display for Reported<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reported::Available(v) => v.fmt(f),
            Reported::Unavailable => f.write_str("not available"),
        }
    }
}

/// Telemetry extracted from the last status payload of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTelemetry {
    pub start_time: Reported<DateTime<Utc>>,
    pub end_time: Reported<DateTime<Utc>>,
    pub log_location: Reported<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Normalized terminal result of a step.
///
/// `telemetry` is `None` exactly when the status is client-synthesized
/// (`Timeout` or `Aborted`): no server payload was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub telemetry: Option<StepTelemetry>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Completed
    }
}
