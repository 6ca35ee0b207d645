//! Human-readable summaries for clusters, steps and runs.

use stepgrid_core::{ClusterDescription, InstanceGroup, StepOutcome, StepStatus};

use crate::orchestrator::{ResizeReport, RunReport, StepReport, TerminationReport};

pub fn format_cluster(cluster: &ClusterDescription) -> String {
    let mut out = String::new();
    out.push_str(&format!("Cluster {} ({})\n", cluster.name, cluster.id));
    out.push_str(&format!("  State:        {}\n", cluster.state));
    out.push_str(&format!(
        "  Master DNS:   {}\n",
        cluster.public_endpoint.as_deref().unwrap_or("not available")
    ));
    if cluster.applications.is_empty() {
        out.push_str("  Applications: none\n");
    } else {
        out.push_str(&format!("  Applications: {}\n", cluster.applications.join(", ")));
    }
    out.push_str(&format!(
        "  Log URI:      {}\n",
        cluster.log_uri.as_deref().unwrap_or("not available")
    ));
    out
}

pub fn format_groups(groups: &[InstanceGroup]) -> String {
    if groups.is_empty() {
        return "No instance groups.\n".to_string();
    }
    let mut out = format!("{:<24} {:<7} {:<12} {:>9} {:>8}\n", "ID", "ROLE", "TYPE", "REQUESTED", "RUNNING");
    for g in groups {
        out.push_str(&format!(
            "{:<24} {:<7} {:<12} {:>9} {:>8}\n",
            g.id, g.role, g.instance_type, g.requested_count, g.running_count
        ));
    }
    out
}

/// Summary of one step outcome. Every status, TIMEOUT and ABORTED
/// included, produces a non-empty summary.
pub fn format_outcome(name: &str, outcome: &StepOutcome) -> String {
    let mut out = format!("Step {name}: {}\n", outcome.status);
    match &outcome.telemetry {
        Some(t) => {
            out.push_str(&format!("  Started:  {}\n", t.start_time));
            out.push_str(&format!("  Ended:    {}\n", t.end_time));
            out.push_str(&format!("  Logs:     {}\n", t.log_location));
            if let Some(reason) = &t.failure_reason {
                out.push_str(&format!("  Reason:   {reason}\n"));
            }
        }
        None => {
            let note = match outcome.status {
                StepStatus::Timeout => "no terminal state within the polling budget; the step may still be running",
                StepStatus::Aborted => "polling cancelled; the step may still be running",
                _ => "no telemetry reported",
            };
            out.push_str(&format!("  {note}\n"));
        }
    }
    out
}

fn format_step(report: &StepReport) -> String {
    let label = format!("{} [{}] #{}", report.step_name, report.handle.step_id, report.iteration);
    format_outcome(&label, &report.outcome)
}

pub fn format_run(report: &RunReport) -> String {
    let mut out = String::new();
    let origin = if report.created { "created" } else { "existing" };
    out.push_str(&format!("Cluster: {} ({origin})\n", report.cluster));

    match &report.resize {
        ResizeReport::NotRequested => {}
        ResizeReport::Applied { group_id, from, to } => {
            out.push_str(&format!("Resize:  {group_id} {from} → {to}\n"));
        }
        ResizeReport::Skipped => out.push_str("Resize:  skipped (no target count)\n"),
        ResizeReport::NoCoreGroup => out.push_str("Resize:  skipped (no CORE group)\n"),
    }
    out.push('\n');

    if report.steps.is_empty() {
        out.push_str("No steps were run.\n");
    }
    for step in &report.steps {
        out.push_str(&format_step(step));
    }

    let completed = report.steps.iter().filter(|s| s.outcome.succeeded()).count();
    out.push_str(&format!("\n{completed}/{} step(s) completed", report.steps.len()));
    if report.stopped_early {
        out.push_str(", batch stopped early");
    }
    out.push('\n');

    match &report.termination {
        TerminationReport::NotRequested => {}
        TerminationReport::Terminated => out.push_str("Cluster terminated.\n"),
        TerminationReport::AlreadyTerminated => out.push_str("Cluster was already terminated.\n"),
        TerminationReport::Kept => out.push_str("Cluster kept running (batch stopped early).\n"),
        TerminationReport::Failed { reason } => {
            out.push_str(&format!("Cluster termination failed: {reason}\n"));
        }
    }
    out
}
