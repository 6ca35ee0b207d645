//! Status poller — drives a step handle to a terminal state.
//!
//! ```text
//! attempt = 0
//! while attempt < max_attempts:
//!     status = describe_step(handle)        # failure → Query error, no retry
//!     if status in {COMPLETED, FAILED, CANCELLED}:
//!         return (status, response)
//!     wait(interval); attempt += 1
//! return (TIMEOUT, none)
//! ```
//!
//! The wait is raced against the caller's shutdown signal; a cancelled poll
//! returns `ABORTED`, which is distinct from both `TIMEOUT` (budget spent)
//! and server-side `CANCELLED`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use stepgrid_control::{ControlError, ControlPlane, ControlResult, RemoteError};
use stepgrid_core::config::{PollConfig, parse_duration};
use stepgrid_core::{StepDescription, StepHandle, StepStatus};

use crate::clock::Clock;

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// When set, the wait doubles after each non-terminal poll up to this cap.
    pub max_interval: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 60,
            max_interval: None,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            max_interval: None,
        }
    }

    pub fn from_config(config: &PollConfig) -> anyhow::Result<Self> {
        let interval = parse_duration(&config.interval)
            .ok_or_else(|| anyhow::anyhow!("invalid poll interval: {}", config.interval))?;
        let max_interval = match &config.max_interval {
            Some(s) => Some(
                parse_duration(s)
                    .ok_or_else(|| anyhow::anyhow!("invalid poll max_interval: {s}"))?,
            ),
            None => None,
        };
        Ok(Self {
            interval,
            max_attempts: config.max_attempts,
            max_interval,
        })
    }

    /// Wait to apply after the given number of consecutive non-terminal polls.
    pub fn wait_after(&self, polls: u32) -> Duration {
        match self.max_interval {
            None => self.interval,
            Some(cap) => {
                let factor = 1u32.checked_shl(polls.saturating_sub(1)).unwrap_or(u32::MAX);
                self.interval.saturating_mul(factor).min(cap.max(self.interval))
            }
        }
    }

    /// Upper bound on the time spent waiting before giving up.
    pub fn budget(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|n| self.wait_after(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Result of polling a step.
///
/// `response` is present exactly when `status` is server-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub status: StepStatus,
    pub response: Option<StepDescription>,
    /// Number of status queries issued.
    pub attempts: u32,
    /// Number of waits taken between queries.
    pub waits: u32,
}

pub struct StatusPoller {
    plane: Arc<dyn ControlPlane>,
    clock: Arc<dyn Clock>,
}

impl StatusPoller {
    pub fn new(plane: Arc<dyn ControlPlane>, clock: Arc<dyn Clock>) -> Self {
        Self { plane, clock }
    }

    /// Query one step's current status.
    pub async fn query(&self, handle: &StepHandle) -> ControlResult<StepDescription> {
        self.plane
            .describe_step(&handle.cluster_id, &handle.step_id)
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(_) => ControlError::NotFound(format!("step {handle}")),
                other => ControlError::Query(other),
            })
    }

    /// Poll until the step reaches a server-terminal state, the attempt
    /// budget is spent, or `shutdown` flips to `true`.
    ///
    /// Query failures are returned as errors, never retried here.
    pub async fn poll_until_terminal(
        &self,
        handle: &StepHandle,
        policy: &PollPolicy,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlResult<PollReport> {
        let mut attempt: u32 = 0;
        let mut waits: u32 = 0;

        while attempt < policy.max_attempts {
            let response = tokio::select! {
                biased;
                _ = cancelled(shutdown) => return Ok(aborted(handle, attempt, waits)),
                response = self.query(handle) => response?,
            };
            let status = response.status;
            debug!(step = %handle, attempt = attempt + 1, %status, "step status");

            if status.is_server_terminal() {
                info!(step = %handle, %status, attempts = attempt + 1, "step reached terminal state");
                return Ok(PollReport {
                    status,
                    response: Some(response),
                    attempts: attempt + 1,
                    waits,
                });
            }

            attempt += 1;
            let wait = policy.wait_after(attempt);
            tokio::select! {
                biased;
                _ = cancelled(shutdown) => return Ok(aborted(handle, attempt, waits)),
                _ = self.clock.sleep(wait) => {}
            }
            waits += 1;
        }

        warn!(
            step = %handle,
            attempts = attempt,
            budget_secs = policy.budget().as_secs(),
            "step did not reach a terminal state within the polling budget"
        );
        Ok(PollReport {
            status: StepStatus::Timeout,
            response: None,
            attempts: attempt,
            waits,
        })
    }
}

fn aborted(handle: &StepHandle, attempts: u32, waits: u32) -> PollReport {
    info!(step = %handle, attempts, "polling cancelled by caller");
    PollReport {
        status: StepStatus::Aborted,
        response: None,
        attempts,
        waits,
    }
}

/// Resolves once shutdown has been requested. Never resolves if the sender
/// is dropped without requesting it.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
