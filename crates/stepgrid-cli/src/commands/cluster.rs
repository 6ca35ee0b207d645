use stepgrid_control::{ResizeAck, TerminateAck};
use stepgrid_core::ClusterHandle;
use stepgrid_orchestrator::ResizeReport;
use stepgrid_orchestrator::summary::{format_cluster, format_groups};

use super::{ClusterArgs, Context};

pub async fn create(ctx: &Context, args: &ClusterArgs) -> anyhow::Result<()> {
    let spec = args.to_spec(&ctx.config.cluster)?;
    let handle = ctx.cluster_control()?.create_cluster(&spec).await?;
    ctx.emit(&handle, || format!("✓ Created cluster {handle} ({})\n", spec.name))
}

pub async fn describe(ctx: &Context, cluster_id: &str) -> anyhow::Result<()> {
    let description = ctx
        .cluster_control()?
        .describe_cluster(&ClusterHandle::new(cluster_id))
        .await?;
    ctx.emit(&description, || format_cluster(&description))
}

pub async fn groups(ctx: &Context, cluster_id: &str) -> anyhow::Result<()> {
    let groups = ctx
        .cluster_control()?
        .list_instance_groups(&ClusterHandle::new(cluster_id))
        .await?;
    ctx.emit(&groups, || format_groups(&groups))
}

/// Resize a named group, or the CORE group when no group is given.
pub async fn resize(ctx: &Context, cluster_id: &str, group: Option<&str>, count: u32) -> anyhow::Result<()> {
    let handle = ClusterHandle::new(cluster_id);
    let control = ctx.cluster_control()?;

    match group {
        Some(group_id) => {
            let ack = control
                .resize_instance_group(&handle, Some(group_id), Some(count))
                .await?;
            ctx.emit(&ack, || match &ack {
                ResizeAck::Applied { group_id, count } => {
                    format!("✓ Resized {group_id} to {count} node(s)\n")
                }
                ResizeAck::Skipped => "Resize skipped: count must be non-zero\n".to_string(),
            })
        }
        None => {
            let orchestrator = ctx.orchestrator(ctx.config.submit.clone())?;
            let report = orchestrator.resize_core(&handle, count).await?;
            ctx.emit(&report, || match &report {
                ResizeReport::Applied { group_id, from, to } => {
                    format!("✓ Resized CORE group {group_id}: {from} → {to}\n")
                }
                ResizeReport::NoCoreGroup => format!("Cluster {handle} has no CORE group; nothing resized\n"),
                ResizeReport::Skipped | ResizeReport::NotRequested => {
                    "Resize skipped: count must be non-zero\n".to_string()
                }
            })
        }
    }
}

pub async fn terminate(ctx: &Context, cluster_id: &str) -> anyhow::Result<()> {
    let handle = ClusterHandle::new(cluster_id);
    let ack = ctx.cluster_control()?.terminate_cluster(&handle).await?;
    ctx.emit(&ack, || match ack {
        TerminateAck::Terminated => format!("✓ Terminating cluster {handle}\n"),
        TerminateAck::AlreadyTerminated => {
            format!("Cluster {handle} was already terminated\n")
        }
    })
}
