use tracing::info;

use stepgrid_core::{ClusterHandle, StepSpec};
use stepgrid_orchestrator::summary::{format_outcome, format_run};
use stepgrid_orchestrator::{ClusterTarget, OrchestratorError, RunPlan};

use super::{ClusterArgs, Context, OutputFormat, PollArgs, StepOptions, shutdown_on_ctrl_c};

/// Everything `stepctl run` was given, before it becomes a plan.
pub struct RunRequest<'a> {
    pub cluster_id: Option<&'a str>,
    pub create: &'a ClusterArgs,
    pub artifacts: &'a [String],
    pub options: &'a StepOptions,
    pub resize_core: Option<u32>,
    pub repeat: u32,
    pub terminate: bool,
    pub poll: &'a PollArgs,
}

pub fn build_plan(ctx: &Context, request: &RunRequest<'_>) -> anyhow::Result<RunPlan> {
    let cluster = match request.cluster_id {
        Some(id) => ClusterTarget::Existing(ClusterHandle::new(id)),
        None => ClusterTarget::Create(request.create.to_spec(&ctx.config.cluster)?),
    };
    if request.artifacts.is_empty() {
        anyhow::bail!("at least one --artifact is required");
    }

    Ok(RunPlan {
        cluster,
        resize_core_to: request.resize_core,
        steps: step_specs(request.options, request.artifacts),
        repeat: request.repeat,
        poll: request.poll.policy(&ctx.config.poll)?,
        terminate_after: request.terminate,
    })
}

/// One step per artifact; names get a position suffix when there are several.
fn step_specs(options: &StepOptions, artifacts: &[String]) -> Vec<StepSpec> {
    artifacts
        .iter()
        .enumerate()
        .map(|(i, artifact)| {
            let name = if artifacts.len() == 1 {
                options.step_name.clone()
            } else {
                format!("{} #{}", options.step_name, i + 1)
            };
            options.to_spec(name, artifact)
        })
        .collect()
}

pub async fn run(ctx: &Context, request: &RunRequest<'_>) -> anyhow::Result<()> {
    let plan = build_plan(ctx, request)?;
    let orchestrator = ctx.orchestrator(request.options.profile(&ctx.config.submit))?;
    info!(steps = plan.steps.len(), repeat = plan.repeat, "starting run");

    let mut shutdown = shutdown_on_ctrl_c();
    match orchestrator.run(&plan, &mut shutdown).await {
        Ok(report) => {
            ctx.emit(&report, || format_run(&report))?;
            if !report.succeeded() {
                anyhow::bail!("run on {} did not complete every step", report.cluster);
            }
            Ok(())
        }
        Err(err) => {
            if ctx.format == OutputFormat::Text {
                if let Some(cluster) = err.cluster() {
                    println!("Cluster: {cluster}");
                }
                for step in err.completed() {
                    print!("{}", format_outcome(&step.step_name, &step.outcome));
                }
            }
            Err(describe_failure(err))
        }
    }
}

fn describe_failure(err: OrchestratorError) -> anyhow::Error {
    let hint = match (&err, err.cluster()) {
        (OrchestratorError::StepAborted { cluster, .. }, _) => {
            format!("cluster {cluster} is still running; submitted steps were not cancelled")
        }
        (OrchestratorError::Setup { .. }, Some(cluster)) => {
            format!("cluster {cluster} was created and is still running")
        }
        (OrchestratorError::Setup { .. }, None) => String::new(),
    };
    if hint.is_empty() {
        err.into()
    } else {
        anyhow::Error::new(err).context(hint)
    }
}
