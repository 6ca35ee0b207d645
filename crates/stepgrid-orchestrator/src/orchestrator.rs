//! Run orchestrator — sequences cluster setup, steps and teardown.
//!
//! One run works on one cluster:
//!
//! 1. create the cluster, or validate an existing handle
//! 2. optionally resize the CORE group (no CORE group → warn and skip)
//! 3. for each iteration, for each step: submit, poll, reduce; the next
//!    step is not submitted until the previous one is terminal
//! 4. optionally terminate the cluster (logged, never fatal)
//!
//! Server-terminal outcomes, FAILED included, let the batch continue. A
//! TIMEOUT or ABORTED outcome stops it, and a component error aborts the
//! run with the reports gathered so far.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use stepgrid_control::{ClusterControl, ControlError, ControlResult, ResizeAck, TerminateAck};
use stepgrid_core::{
    ClusterHandle, ClusterSpec, InstanceRole, StepHandle, StepOutcome, StepSpec, SubmitProfile,
};

use crate::clock::Clock;
use crate::error::OrchestratorError;
use crate::poller::{PollPolicy, PollReport, StatusPoller};
use crate::reducer::reduce;
use crate::submitter::StepSubmitter;

/// Which cluster a run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterTarget {
    Create(ClusterSpec),
    Existing(ClusterHandle),
}

/// Everything a run needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub cluster: ClusterTarget,
    /// Target CORE node count, if the group should be resized.
    pub resize_core_to: Option<u32>,
    pub steps: Vec<StepSpec>,
    /// Number of passes over `steps`; values below 1 mean one pass.
    pub repeat: u32,
    pub poll: PollPolicy,
    pub terminate_after: bool,
}

impl RunPlan {
    pub fn new(cluster: ClusterTarget, steps: Vec<StepSpec>) -> Self {
        Self {
            cluster,
            resize_core_to: None,
            steps,
            repeat: 1,
            poll: PollPolicy::default(),
            terminate_after: false,
        }
    }
}

/// What happened to the CORE group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResizeReport {
    NotRequested,
    Applied { group_id: String, from: u32, to: u32 },
    /// The target count was zero; nothing was sent.
    Skipped,
    NoCoreGroup,
}

/// What happened at teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TerminationReport {
    NotRequested,
    Terminated,
    AlreadyTerminated,
    /// Termination was requested but the batch stopped early; the cluster
    /// is kept so the unfinished step can still be inspected.
    Kept,
    Failed { reason: String },
}

/// One step that reached a terminal state (server-side or synthesized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based pass over the step list.
    pub iteration: u32,
    pub step_name: String,
    pub handle: StepHandle,
    pub outcome: StepOutcome,
    /// Status queries issued while polling.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub cluster: ClusterHandle,
    pub created: bool,
    pub resize: ResizeReport,
    pub steps: Vec<StepReport>,
    /// A step timed out or polling was cancelled before the batch finished.
    pub stopped_early: bool,
    pub termination: TerminationReport,
}

impl RunReport {
    /// Every step ran and completed.
    pub fn succeeded(&self) -> bool {
        !self.stopped_early && self.steps.iter().all(|s| s.outcome.succeeded())
    }
}

pub struct Orchestrator {
    control: ClusterControl,
    submitter: StepSubmitter,
    poller: StatusPoller,
}

impl Orchestrator {
    pub fn new(control: ClusterControl, profile: SubmitProfile, clock: Arc<dyn Clock>) -> Self {
        let plane = control.plane();
        Self {
            submitter: StepSubmitter::new(plane.clone(), profile),
            poller: StatusPoller::new(plane, clock),
            control,
        }
    }

    pub fn control(&self) -> &ClusterControl {
        &self.control
    }

    pub fn submitter(&self) -> &StepSubmitter {
        &self.submitter
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// Execute a run plan.
    pub async fn run(
        &self,
        plan: &RunPlan,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunReport, OrchestratorError> {
        let (cluster, created) = match &plan.cluster {
            ClusterTarget::Create(spec) => {
                let handle = self
                    .control
                    .create_cluster(spec)
                    .await
                    .map_err(|source| OrchestratorError::Setup {
                        cluster: None,
                        source,
                    })?;
                (handle, true)
            }
            ClusterTarget::Existing(handle) => {
                let description = self.control.describe_cluster(handle).await.map_err(|source| {
                    OrchestratorError::Setup {
                        cluster: None,
                        source,
                    }
                })?;
                info!(cluster_id = %handle, state = %description.state, "reusing cluster");
                (handle.clone(), false)
            }
        };

        let resize = match plan.resize_core_to {
            Some(target) => self.resize_core(&cluster, target).await.map_err(|source| {
                OrchestratorError::Setup {
                    cluster: created.then(|| cluster.clone()),
                    source,
                }
            })?,
            None => ResizeReport::NotRequested,
        };

        let iterations = plan.repeat.max(1);
        let mut steps = Vec::with_capacity(plan.steps.len() * iterations as usize);
        let mut stopped_early = false;

        'batch: for iteration in 1..=iterations {
            for step in &plan.steps {
                if *shutdown.borrow() {
                    info!(cluster_id = %cluster, step = %step.name, "shutdown requested, not submitting further steps");
                    stopped_early = true;
                    break 'batch;
                }

                let report = match self.run_step(&cluster, step, iteration, &plan.poll, shutdown).await {
                    Ok(report) => report,
                    Err(source) => {
                        warn!(cluster_id = %cluster, step = %step.name, iteration, error = %source, "step aborted");
                        return Err(OrchestratorError::StepAborted {
                            step: step.name.clone(),
                            cluster,
                            completed: steps,
                            source,
                        });
                    }
                };

                let status = report.outcome.status;
                steps.push(report);
                if !status.is_server_terminal() {
                    warn!(cluster_id = %cluster, step = %step.name, iteration, %status, "stopping batch");
                    stopped_early = true;
                    break 'batch;
                }
            }
        }

        let termination = if !plan.terminate_after {
            TerminationReport::NotRequested
        } else if stopped_early {
            info!(cluster_id = %cluster, "batch stopped early, keeping cluster");
            TerminationReport::Kept
        } else {
            self.terminate_quietly(&cluster).await
        };

        Ok(RunReport {
            cluster,
            created,
            resize,
            steps,
            stopped_early,
            termination,
        })
    }

    /// Resize the CORE group to `target` nodes.
    ///
    /// A cluster without a CORE group is not an error: the resize is
    /// skipped with a warning.
    pub async fn resize_core(&self, cluster: &ClusterHandle, target: u32) -> ControlResult<ResizeReport> {
        let Some(core) = self.control.find_group(cluster, InstanceRole::Core).await? else {
            warn!(cluster_id = %cluster, "no CORE instance group, skipping resize");
            return Ok(ResizeReport::NoCoreGroup);
        };

        debug!(cluster_id = %cluster, group_id = %core.id, from = core.requested_count, to = target, "resizing CORE group");
        match self
            .control
            .resize_instance_group(cluster, Some(&core.id), Some(target))
            .await?
        {
            ResizeAck::Applied { group_id, count } => Ok(ResizeReport::Applied {
                group_id,
                from: core.requested_count,
                to: count,
            }),
            ResizeAck::Skipped => Ok(ResizeReport::Skipped),
        }
    }

    /// Submit one step, then wait for it.
    pub async fn run_step(
        &self,
        cluster: &ClusterHandle,
        step: &StepSpec,
        iteration: u32,
        policy: &PollPolicy,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlResult<StepReport> {
        let handle = self.submitter.submit_step(cluster, step).await?;
        let (outcome, poll) = self.wait_step(cluster, &handle, policy, shutdown).await?;
        Ok(StepReport {
            iteration,
            step_name: step.name.clone(),
            handle,
            outcome,
            attempts: poll.attempts,
        })
    }

    /// Poll an already-submitted step on `cluster` and reduce its outcome.
    pub async fn wait_step(
        &self,
        cluster: &ClusterHandle,
        handle: &StepHandle,
        policy: &PollPolicy,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlResult<(StepOutcome, PollReport)> {
        if handle.cluster_id != cluster.cluster_id {
            return Err(ControlError::NotFound(format!(
                "step {} belongs to cluster {}, not {cluster}",
                handle.step_id, handle.cluster_id
            )));
        }

        let poll = self.poller.poll_until_terminal(handle, policy, shutdown).await?;
        let outcome = reduce(poll.status, poll.response.as_ref());
        info!(step = %handle, status = %outcome.status, attempts = poll.attempts, "step finished");
        Ok((outcome, poll))
    }

    async fn terminate_quietly(&self, cluster: &ClusterHandle) -> TerminationReport {
        match self.control.terminate_cluster(cluster).await {
            Ok(TerminateAck::Terminated) => TerminationReport::Terminated,
            Ok(TerminateAck::AlreadyTerminated) => TerminationReport::AlreadyTerminated,
            Err(e) => {
                warn!(cluster_id = %cluster, error = %e, "failed to terminate cluster");
                TerminationReport::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use stepgrid_control::testing::MockControlPlane;
    use stepgrid_control::{ProvisioningSettings, RemoteError};
    use stepgrid_core::{ClusterState, StepStatus};

    fn orchestrator(mock: &Arc<MockControlPlane>) -> Orchestrator {
        Orchestrator::new(
            ClusterControl::new(mock.clone(), ProvisioningSettings::default()),
            SubmitProfile::default(),
            Arc::new(ManualClock::new()),
        )
    }

    #[tokio::test]
    async fn wait_step_refuses_foreign_handle() {
        let mock = Arc::new(MockControlPlane::new());
        let a = mock.add_cluster("j-A", ClusterState::Running, 2);
        mock.add_cluster("j-B", ClusterState::Running, 2);
        let handle = mock.add_step("j-B", "s-1");
        let (_tx, mut rx) = watch::channel(false);

        let result = orchestrator(&mock)
            .wait_step(&a, &handle, &PollPolicy::default(), &mut rx)
            .await;
        assert!(matches!(result, Err(ControlError::NotFound(_))));
        assert_eq!(mock.calls("describe_step"), 0);
    }

    #[tokio::test]
    async fn resize_core_reports_previous_count() {
        let mock = Arc::new(MockControlPlane::new());
        let cluster = mock.add_cluster("j-1", ClusterState::Waiting, 3);

        let report = orchestrator(&mock).resize_core(&cluster, 5).await.unwrap();
        assert_eq!(
            report,
            ResizeReport::Applied {
                group_id: "ig-j-1-core".to_string(),
                from: 3,
                to: 5
            }
        );
    }

    #[tokio::test]
    async fn resize_core_to_zero_is_skipped() {
        let mock = Arc::new(MockControlPlane::new());
        let cluster = mock.add_cluster("j-1", ClusterState::Waiting, 3);

        let report = orchestrator(&mock).resize_core(&cluster, 0).await.unwrap();
        assert_eq!(report, ResizeReport::Skipped);
        assert_eq!(mock.calls("modify_instance_groups"), 0);
    }

    #[tokio::test]
    async fn terminate_failure_is_reported_not_raised() {
        let mock = Arc::new(MockControlPlane::new());
        let cluster = mock.add_cluster("j-1", ClusterState::Waiting, 2);
        mock.fail_next("terminate_clusters", RemoteError::Unavailable("throttled".to_string()));

        let report = orchestrator(&mock).terminate_quietly(&cluster).await;
        assert!(matches!(report, TerminationReport::Failed { reason } if reason.contains("throttled")));
    }

    #[test]
    fn reports_serialize_with_result_tags() {
        let resize = serde_json::to_value(ResizeReport::NoCoreGroup).unwrap();
        assert_eq!(resize, serde_json::json!({ "result": "no_core_group" }));

        let failed = serde_json::to_value(TerminationReport::Failed {
            reason: "throttled".to_string(),
        })
        .unwrap();
        assert_eq!(failed["result"], "failed");
        assert_eq!(failed["reason"], "throttled");
    }

    #[test]
    fn run_report_success_requires_all_completed() {
        let report = |status: StepStatus| RunReport {
            cluster: ClusterHandle::new("j-1"),
            created: false,
            resize: ResizeReport::NotRequested,
            steps: vec![StepReport {
                iteration: 1,
                step_name: "join".to_string(),
                handle: StepHandle {
                    step_id: "s-1".to_string(),
                    cluster_id: "j-1".to_string(),
                },
                outcome: reduce(status, None),
                attempts: 1,
            }],
            stopped_early: false,
            termination: TerminationReport::NotRequested,
        };
        assert!(report(StepStatus::Completed).succeeded());
        assert!(!report(StepStatus::Failed).succeeded());
    }
}
