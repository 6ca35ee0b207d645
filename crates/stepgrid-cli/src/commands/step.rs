use serde::Serialize;

use stepgrid_core::{ClusterHandle, StepHandle, StepOutcome};
use stepgrid_orchestrator::summary::format_outcome;

use super::{Context, OutputFormat, PollArgs, StepOptions, shutdown_on_ctrl_c};

#[derive(Serialize)]
struct WaitedStep<'a> {
    handle: &'a StepHandle,
    outcome: &'a StepOutcome,
    attempts: u32,
}

pub async fn submit(
    ctx: &Context,
    cluster_id: &str,
    artifact: &str,
    options: &StepOptions,
    wait: bool,
    poll: &PollArgs,
) -> anyhow::Result<()> {
    let cluster = ClusterHandle::new(cluster_id);
    let orchestrator = ctx.orchestrator(options.profile(&ctx.config.submit))?;
    let spec = options.to_spec(options.step_name.clone(), artifact);
    let handle = orchestrator.submitter().submit_step(&cluster, &spec).await?;

    if !wait {
        return ctx.emit(&handle, || format!("✓ Submitted step {}\n", handle.step_id));
    }

    let policy = poll.policy(&ctx.config.poll)?;
    if ctx.format == OutputFormat::Text {
        println!("✓ Submitted step {}, waiting (up to {:?})", handle.step_id, policy.budget());
    }
    let mut shutdown = shutdown_on_ctrl_c();
    let (outcome, report) = orchestrator
        .wait_step(&cluster, &handle, &policy, &mut shutdown)
        .await?;
    finish(ctx, &spec.name, &handle, &outcome, report.attempts)
}

pub async fn wait(ctx: &Context, cluster_id: &str, step_id: &str, poll: &PollArgs) -> anyhow::Result<()> {
    let cluster = ClusterHandle::new(cluster_id);
    let handle = StepHandle {
        step_id: step_id.to_string(),
        cluster_id: cluster_id.to_string(),
    };
    let policy = poll.policy(&ctx.config.poll)?;
    let orchestrator = ctx.orchestrator(ctx.config.submit.clone())?;

    let mut shutdown = shutdown_on_ctrl_c();
    let (outcome, report) = orchestrator
        .wait_step(&cluster, &handle, &policy, &mut shutdown)
        .await?;
    finish(ctx, step_id, &handle, &outcome, report.attempts)
}

fn finish(
    ctx: &Context,
    name: &str,
    handle: &StepHandle,
    outcome: &StepOutcome,
    attempts: u32,
) -> anyhow::Result<()> {
    let waited = WaitedStep {
        handle,
        outcome,
        attempts,
    };
    ctx.emit(&waited, || format_outcome(name, outcome))?;
    if !outcome.succeeded() {
        anyhow::bail!("step {} finished as {}", handle.step_id, outcome.status);
    }
    Ok(())
}
