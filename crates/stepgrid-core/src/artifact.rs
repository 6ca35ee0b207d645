//! Artifact location resolution.
//!
//! StepGrid never reads artifact bytes; it only checks that a location is
//! something the remote step runner can fetch and passes it through.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArtifactUri {
    /// Object store: s3://bucket/path/to/job.jar
    S3 { bucket: String, key: String },
    /// HTTP(S): https://releases.example.com/job.jar
    Https { url: String },
    /// Node-local file: file:///usr/lib/spark/examples/jars/spark-examples.jar
    File { path: String },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("unsupported artifact scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid artifact location: {0}")]
    InvalidUri(String),
}

impl ArtifactUri {
    pub fn parse(uri: &str) -> Result<Self, ArtifactError> {
        let uri = uri.trim();
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(ArtifactError::InvalidUri(uri.to_string()));
            }
            Ok(ArtifactUri::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        } else if uri.starts_with("https://") || uri.starts_with("http://") {
            Ok(ArtifactUri::Https { url: uri.to_string() })
        } else if let Some(path) = uri.strip_prefix("file://") {
            if !path.starts_with('/') {
                return Err(ArtifactError::InvalidUri(uri.to_string()));
            }
            Ok(ArtifactUri::File { path: path.to_string() })
        } else if uri.is_empty() {
            Err(ArtifactError::InvalidUri(uri.to_string()))
        } else {
            Err(ArtifactError::UnsupportedScheme(uri.to_string()))
        }
    }

    /// Parse a location that must name a single object (non-empty key).
    pub fn parse_object(uri: &str) -> Result<Self, ArtifactError> {
        let parsed = Self::parse(uri)?;
        if let ArtifactUri::S3 { key, .. } = &parsed
            && (key.is_empty() || key.ends_with('/'))
        {
            return Err(ArtifactError::InvalidUri(uri.to_string()));
        }
        Ok(parsed)
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ArtifactUri::S3 { .. } => "s3",
            ArtifactUri::Https { .. } => "https",
            ArtifactUri::File { .. } => "file",
        }
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactUri::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            ArtifactUri::Https { url } => f.write_str(url),
            ArtifactUri::File { path } => write!(f, "file://{path}"),
        }
    }
}
