//! Orchestrator error types.

use thiserror::Error;

use stepgrid_control::ControlError;
use stepgrid_core::ClusterHandle;

use crate::orchestrator::StepReport;

/// A run that could not be carried to the end.
///
/// Both variants keep whatever the run had already established, so the
/// caller can still report on (or clean up) a cluster it never got back.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Creating, validating or resizing the cluster failed.
    #[error("cluster setup failed: {source}")]
    Setup {
        /// Set when the cluster was created before the failure.
        cluster: Option<ClusterHandle>,
        #[source]
        source: ControlError,
    },

    /// A component failed while processing a step. Steps already
    /// submitted are left running.
    #[error("step `{step}` aborted after {} finished step(s): {source}", .completed.len())]
    StepAborted {
        step: String,
        cluster: ClusterHandle,
        completed: Vec<StepReport>,
        #[source]
        source: ControlError,
    },
}

impl OrchestratorError {
    /// The underlying control error.
    pub fn control_error(&self) -> &ControlError {
        match self {
            OrchestratorError::Setup { source, .. } => source,
            OrchestratorError::StepAborted { source, .. } => source,
        }
    }

    /// The cluster the run was working on, if one was established.
    pub fn cluster(&self) -> Option<&ClusterHandle> {
        match self {
            OrchestratorError::Setup { cluster, .. } => cluster.as_ref(),
            OrchestratorError::StepAborted { cluster, .. } => Some(cluster),
        }
    }

    /// Reports for the steps that reached a terminal state before the failure.
    pub fn completed(&self) -> &[StepReport] {
        match self {
            OrchestratorError::Setup { .. } => &[],
            OrchestratorError::StepAborted { completed, .. } => completed,
        }
    }
}
