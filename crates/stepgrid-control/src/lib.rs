//! stepgrid-control — the remote control plane boundary.
//!
//! Defines the [`ControlPlane`] trait that every remote call goes through,
//! the [`ClusterControl`] facade for cluster-level operations, and an HTTP
//! implementation of the trait.
//!
//! # Architecture
//!
//! ```text
//! ClusterControl (create / describe / groups / resize / terminate)
//!   └── Arc<dyn ControlPlane>
//!         ├── HttpControlPlane   (JSON over HTTP/1.1, hyper)
//!         └── MockControlPlane   (in-memory, `testing` feature)
//! ```
//!
//! Raw call failures are [`RemoteError`]s; the facade gives them meaning
//! as [`ControlError`]s. Nothing in this crate retries.

pub mod cluster;
pub mod error;
pub mod http;
pub mod plane;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cluster::{ClusterControl, ProvisioningSettings, ResizeAck, TerminateAck};
pub use error::{ControlError, ControlResult, RemoteError};
pub use http::HttpControlPlane;
pub use plane::{ArtifactObject, ArtifactStore, ControlPlane, StepConfig};
