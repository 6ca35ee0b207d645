pub mod artifact;
pub mod config;
pub mod types;

pub use artifact::{ArtifactError, ArtifactUri};
pub use config::{StepGridConfig, SubmitProfile};
pub use types::*;
