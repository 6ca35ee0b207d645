//! stepgrid-orchestrator — the cluster/step lifecycle.
//!
//! Composes the control plane boundary into runs:
//!
//! ```text
//! Orchestrator::run(plan)
//!   ├── ClusterControl      create | validate existing, resize CORE
//!   ├── StepSubmitter       StepSpec → StepHandle   (one step at a time)
//!   ├── StatusPoller        StepHandle → (status, last payload)
//!   │     └── Clock         injected sleep (tokio, or manual in tests)
//!   ├── reduce              (status, payload) → StepOutcome
//!   └── ClusterControl      terminate (optional, never fatal)
//! ```
//!
//! Polling is the only suspension point. It can be cut short through a
//! `watch::Receiver<bool>` shutdown signal, which yields an `ABORTED`
//! outcome rather than an error.

pub mod clock;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod reducer;
pub mod submitter;
pub mod summary;

pub use clock::{Clock, ManualClock, TokioClock};
pub use error::OrchestratorError;
pub use orchestrator::{
    ClusterTarget, Orchestrator, ResizeReport, RunPlan, RunReport, StepReport, TerminationReport,
};
pub use poller::{PollPolicy, PollReport, StatusPoller};
pub use reducer::reduce;
pub use submitter::{StepSubmitter, command_args};
