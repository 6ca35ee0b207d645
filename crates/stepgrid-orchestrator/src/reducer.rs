//! Outcome reducer — normalizes the last status payload of a step.

use stepgrid_core::{Reported, StepDescription, StepOutcome, StepStatus, StepTelemetry};

/// Reduce a poll result to a [`StepOutcome`].
///
/// Client-synthesized statuses carry no telemetry. For everything else each
/// field is read from the payload independently; a missing field becomes
/// [`Reported::Unavailable`] instead of failing the reduction.
pub fn reduce(status: StepStatus, response: Option<&StepDescription>) -> StepOutcome {
    if matches!(status, StepStatus::Timeout | StepStatus::Aborted) {
        return StepOutcome {
            status,
            telemetry: None,
        };
    }

    let telemetry = match response {
        Some(payload) => StepTelemetry {
            start_time: payload.timeline.started_at.into(),
            end_time: payload.timeline.ended_at.into(),
            log_location: payload
                .log_location
                .clone()
                .filter(|l| !l.is_empty())
                .into(),
            failure_reason: payload.failure_reason.clone(),
        },
        None => StepTelemetry {
            start_time: Reported::Unavailable,
            end_time: Reported::Unavailable,
            log_location: Reported::Unavailable,
            failure_reason: None,
        },
    };

    StepOutcome {
        status,
        telemetry: Some(telemetry),
    }
}
