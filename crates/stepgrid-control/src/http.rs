//! JSON-over-HTTP transport for the control plane.
//!
//! Every operation is `POST {endpoint}/v1/{Operation}` with a JSON body and
//! a JSON response. Non-2xx responses carry `{"code": .., "message": ..}`.
//! One connection per call, driven by hyper's HTTP/1 client.
//!
//! Only plain `http://` endpoints are supported; TLS is expected to be
//! terminated by a local gateway.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use stepgrid_core::config::ControlPlaneConfig;
use stepgrid_core::{ClusterDescription, ClusterId, InstanceGroup, StepDescription};

use crate::error::RemoteError;
use crate::plane::{
    AddStepsRequest, AddStepsResponse, ArtifactObject, ArtifactStore, ControlPlane,
    ModifyInstanceGroupsRequest, RunClusterRequest, RunClusterResponse,
};

/// Control plane client speaking JSON over HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    /// `host:port` to connect to.
    address: String,
    /// Value of the `host` header.
    host: String,
    /// Path prefix in front of `/v1/...`, without a trailing slash.
    base_path: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct InstanceGroupsBody {
    #[serde(default)]
    instance_groups: Vec<InstanceGroup>,
}

#[derive(Deserialize)]
struct ArtifactsBody {
    #[serde(default)]
    objects: Vec<ArtifactObject>,
}

impl HttpControlPlane {
    /// Create a client for an endpoint such as `http://127.0.0.1:8480`.
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = endpoint.trim();
        let rest = match endpoint.strip_prefix("http://") {
            Some(rest) => rest,
            None if endpoint.starts_with("https://") => anyhow::bail!(
                "https endpoints are not supported directly, point at a local TLS gateway: {endpoint}"
            ),
            None => anyhow::bail!("endpoint must start with http://, got: {endpoint}"),
        };

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            anyhow::bail!("endpoint has no host: {endpoint}");
        }
        // The port follows the closing bracket of an IPv6 literal.
        let after_host = match authority.strip_prefix('[') {
            Some(v6) => match v6.split_once(']') {
                Some((_, tail)) => tail,
                None => anyhow::bail!("unterminated IPv6 address in endpoint: {endpoint}"),
            },
            None => authority,
        };
        let address = if after_host.contains(':') {
            authority.to_string()
        } else {
            format!("{authority}:80")
        };
        let base_path = match path.trim_end_matches('/') {
            "" => String::new(),
            p => format!("/{p}"),
        };

        Ok(Self {
            address,
            host: authority.to_string(),
            base_path,
            api_key: None,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn from_config(config: &ControlPlaneConfig) -> anyhow::Result<Self> {
        let mut client = Self::new(&config.endpoint)?.with_timeout(config.request_timeout()?);
        if let Some(key) = &config.api_key {
            client = client.with_api_key(key);
        }
        Ok(client)
    }

    /// Send the key as `Authorization: Bearer <key>` on every call.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Deadline for one whole call: connect, request and response body.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn path(&self, operation: &str) -> String {
        format!("{}/v1/{operation}", self.base_path)
    }

    async fn call<Req, Resp>(&self, operation: &str, body: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| RemoteError::Decode(format!("encode {operation}: {e}")))?;
        let path = self.path(operation);

        let (status, bytes) = match tokio::time::timeout(self.timeout, self.send(&path, payload)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RemoteError::Unavailable(format!(
                    "{operation} timed out after {:?}",
                    self.timeout
                )));
            }
        };

        debug!(%operation, status = %status, bytes = bytes.len(), "control plane call");

        if status.is_success() {
            serde_json::from_slice(&bytes)
                .map_err(|e| RemoteError::Decode(format!("{operation}: {e}")))
        } else {
            Err(classify(status, &bytes))
        }
    }

    async fn send(&self, path: &str, payload: Vec<u8>) -> Result<(StatusCode, Bytes), RemoteError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("connect {}: {e}", self.address)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("handshake with {}: {e}", self.address)))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "control plane connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, &self.host)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, concat!("stepgrid/", env!("CARGO_PKG_VERSION")));
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {key}"));
        }
        let request = builder
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| RemoteError::Decode(format!("build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("request {path}: {e}")))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("read {path}: {e}")))?
            .to_bytes();

        Ok((status, body))
    }
}

/// Map a non-2xx response onto the remote error taxonomy.
fn classify(status: StatusCode, body: &[u8]) -> RemoteError {
    let (code, message) = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => (err.code, err.message),
        Err(_) => (None, String::from_utf8_lossy(body).trim().to_string()),
    };

    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        s if s.is_client_error() => RemoteError::Rejected {
            code: code.unwrap_or_else(|| s.as_u16().to_string()),
            message,
        },
        s => RemoteError::Unavailable(format!("{s}: {message}")),
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn run_cluster(&self, req: RunClusterRequest) -> Result<RunClusterResponse, RemoteError> {
        self.call("RunCluster", &req).await
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, RemoteError> {
        self.call("DescribeCluster", &json!({ "cluster_id": cluster_id }))
            .await
    }

    async fn list_instance_groups(&self, cluster_id: &str) -> Result<Vec<InstanceGroup>, RemoteError> {
        let body: InstanceGroupsBody = self
            .call("ListInstanceGroups", &json!({ "cluster_id": cluster_id }))
            .await?;
        Ok(body.instance_groups)
    }

    async fn modify_instance_groups(&self, req: ModifyInstanceGroupsRequest) -> Result<(), RemoteError> {
        let _: IgnoredAny = self.call("ModifyInstanceGroups", &req).await?;
        Ok(())
    }

    async fn add_steps(&self, req: AddStepsRequest) -> Result<AddStepsResponse, RemoteError> {
        self.call("AddSteps", &req).await
    }

    async fn describe_step(&self, cluster_id: &str, step_id: &str) -> Result<StepDescription, RemoteError> {
        self.call(
            "DescribeStep",
            &json!({ "cluster_id": cluster_id, "step_id": step_id }),
        )
        .await
    }

    async fn terminate_clusters(&self, cluster_ids: Vec<ClusterId>) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call("TerminateClusters", &json!({ "cluster_ids": cluster_ids }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for HttpControlPlane {
    async fn list_artifacts(&self, bucket: &str, prefix: &str) -> Result<Vec<ArtifactObject>, RemoteError> {
        let body: ArtifactsBody = self
            .call("ListArtifacts", &json!({ "bucket": bucket, "prefix": prefix }))
            .await?;
        Ok(body.objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_with_port_and_path() {
        let client = HttpControlPlane::new("http://gateway.local:9000/emr/").unwrap();
        assert_eq!(client.address, "gateway.local:9000");
        assert_eq!(client.host, "gateway.local:9000");
        assert_eq!(client.path("DescribeStep"), "/emr/v1/DescribeStep");
    }

    #[test]
    fn parses_endpoint_without_port() {
        let client = HttpControlPlane::new("http://gateway.local").unwrap();
        assert_eq!(client.address, "gateway.local:80");
        assert_eq!(client.path("AddSteps"), "/v1/AddSteps");
    }

    #[test]
    fn ipv6_endpoint_gets_default_port_only_when_missing() {
        let bare = HttpControlPlane::new("http://[::1]/").unwrap();
        assert_eq!(bare.address, "[::1]:80");
        assert_eq!(bare.host, "[::1]");

        let with_port = HttpControlPlane::new("http://[::1]:8480").unwrap();
        assert_eq!(with_port.address, "[::1]:8480");

        assert!(HttpControlPlane::new("http://[::1/").is_err());
    }

    #[test]
    fn rejects_unsupported_endpoints() {
        assert!(HttpControlPlane::new("https://elasticmapreduce.example.com").is_err());
        assert!(HttpControlPlane::new("gateway:80").is_err());
        assert!(HttpControlPlane::new("http://").is_err());
    }

    #[test]
    fn from_config_applies_key_and_timeout() {
        let config = ControlPlaneConfig {
            endpoint: "http://127.0.0.1:8480".to_string(),
            api_key: Some("secret".to_string()),
            request_timeout: "5s".to_string(),
        };
        let client = HttpControlPlane::from_config(&config).unwrap();
        assert_eq!(client.api_key.as_deref(), Some("secret"));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn classify_status_codes() {
        let body = br#"{"code": "ValidationException", "message": "below minimum"}"#;
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, body),
            RemoteError::rejected("ValidationException", "below minimum")
        );
        assert_eq!(
            classify(StatusCode::NOT_FOUND, br#"{"message": "no such cluster"}"#),
            RemoteError::NotFound("no such cluster".to_string())
        );
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, b"denied"),
            RemoteError::Unauthorized(m) if m == "denied"
        ));
        assert!(matches!(
            classify(StatusCode::CONFLICT, b"busy"),
            RemoteError::Rejected { code, .. } if code == "409"
        ));
        assert!(matches!(
            classify(StatusCode::SERVICE_UNAVAILABLE, b""),
            RemoteError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        let client = HttpControlPlane::new("http://127.0.0.1:1")
            .unwrap()
            .with_timeout(Duration::from_millis(500));
        let result = client.describe_cluster("j-1").await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
    }
}
