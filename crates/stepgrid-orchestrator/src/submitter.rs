//! Step submitter — turns a `StepSpec` into a command-runner step.
//!
//! Every step is submitted as a generic command invocation: the runner jar
//! executes `spark-submit` with the resource profile, then the artifact
//! location, then the step's own arguments.

use std::sync::Arc;

use tracing::{debug, info};

use stepgrid_control::{ControlError, ControlPlane, ControlResult, RemoteError, StepConfig};
use stepgrid_control::plane::AddStepsRequest;
use stepgrid_core::{ArtifactUri, ClusterHandle, StepHandle, StepSpec, SubmitProfile};

pub struct StepSubmitter {
    plane: Arc<dyn ControlPlane>,
    profile: SubmitProfile,
}

impl StepSubmitter {
    pub fn new(plane: Arc<dyn ControlPlane>, profile: SubmitProfile) -> Self {
        Self { plane, profile }
    }

    pub fn profile(&self) -> &SubmitProfile {
        &self.profile
    }

    /// Submit one step and return its handle.
    ///
    /// The handle's id is the first id the control plane returns; an empty
    /// id list is a submission failure.
    pub async fn submit_step(
        &self,
        cluster: &ClusterHandle,
        step: &StepSpec,
    ) -> ControlResult<StepHandle> {
        let config = self.build_step_config(step)?;
        debug!(cluster_id = %cluster, step = %step.name, args = ?config.args, "submitting step");

        let response = self
            .plane
            .add_steps(AddStepsRequest {
                cluster_id: cluster.cluster_id.clone(),
                steps: vec![config],
            })
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(_) => ControlError::NotFound(format!("cluster {cluster}")),
                other => ControlError::Submission(other.to_string()),
            })?;

        let step_id = response.step_ids.into_iter().next().ok_or_else(|| {
            ControlError::Submission(format!(
                "control plane returned no step id for `{}` on {cluster}",
                step.name
            ))
        })?;

        info!(cluster_id = %cluster, %step_id, step = %step.name, "step submitted");
        Ok(StepHandle {
            step_id,
            cluster_id: cluster.cluster_id.clone(),
        })
    }

    /// Build the wire step for a spec, validating the artifact location.
    pub fn build_step_config(&self, step: &StepSpec) -> ControlResult<StepConfig> {
        let artifact = ArtifactUri::parse_object(&step.artifact)?;
        Ok(StepConfig {
            name: step.name.clone(),
            action_on_failure: step.action_on_failure,
            jar: self.profile.runner_jar.clone(),
            args: command_args(&self.profile, &artifact, &step.args),
        })
    }
}

/// Full argument vector handed to the command runner.
pub fn command_args(profile: &SubmitProfile, artifact: &ArtifactUri, extra: &[String]) -> Vec<String> {
    let mut args = vec![profile.command.clone()];
    if let Some(class) = &profile.main_class {
        args.extend(["--class".to_string(), class.clone()]);
    }

    let mut flag = |name: &str, value: String| {
        args.push(format!("--{name}"));
        args.push(value);
    };
    flag("master", profile.master.clone());
    flag("deploy-mode", profile.deploy_mode.clone());
    flag("driver-memory", profile.driver_memory.clone());
    flag("driver-cores", profile.driver_cores.to_string());
    flag("num-executors", profile.num_executors.to_string());
    flag("executor-memory", profile.executor_memory.clone());
    flag("executor-cores", profile.executor_cores.to_string());
    for setting in &profile.conf {
        flag("conf", setting.clone());
    }

    args.push(artifact.to_string());
    args.extend(extra.iter().cloned());
    args
}
