//! HTTP transport tests against an in-process gateway.
//!
//! A small axum router stands in for the control plane so the hyper client,
//! the status-code mapping and the JSON records are exercised end to end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use stepgrid_control::plane::{AddStepsRequest, ModifyInstanceGroupsRequest, InstanceGroupModify};
use stepgrid_control::{
    ArtifactStore, ClusterControl, ControlError, ControlPlane, HttpControlPlane,
    ProvisioningSettings, RemoteError, StepConfig, TerminateAck,
};
use stepgrid_core::{ActionOnFailure, ClusterHandle, InstanceRole, StepStatus};

type Reply = (StatusCode, Json<Value>);

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-key")
}

async fn describe_step(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "missing credentials" })),
        );
    }
    if body["step_id"] == "s-missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "NotFound", "message": "step s-missing not found" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": body["step_id"],
            "name": "join",
            "status": "COMPLETED",
            "timeline": { "started_at": "2024-03-01T12:01:00Z" },
            "log_location": "s3://logs/steps/s-1/"
        })),
    )
}

async fn add_steps(Json(body): Json<Value>) -> Reply {
    if body["cluster_id"] == "j-TERMINATED" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": "ValidationException", "message": "cluster is terminated" })),
        );
    }
    let count = body["steps"].as_array().map_or(0, |s| s.len());
    let ids: Vec<String> = (1..=count).map(|i| format!("s-{i}")).collect();
    (StatusCode::OK, Json(json!({ "step_ids": ids })))
}

async fn list_groups() -> Reply {
    (
        StatusCode::OK,
        Json(json!({
            "instance_groups": [
                { "id": "ig-m", "role": "MASTER", "instance_type": "m5.xlarge", "requested_count": 1, "running_count": 1 },
                { "id": "ig-c", "role": "CORE", "instance_type": "m5.xlarge", "requested_count": 2, "running_count": 2 }
            ]
        })),
    )
}

async fn modify(Json(body): Json<Value>) -> Reply {
    if body["groups"][0]["count"] == 0 {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "boom" })));
    }
    (StatusCode::OK, Json(json!({})))
}

async fn terminate() -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "cluster already gone" })),
    )
}

async fn describe_cluster() -> &'static str {
    "definitely not json"
}

async fn list_artifacts(Json(body): Json<Value>) -> Reply {
    let prefix = body["prefix"].as_str().unwrap_or_default().to_string();
    let objects: Vec<Value> = ["jobs/join.jar", "jobs/wordcount.py", "input/a.csv"]
        .into_iter()
        .filter(|k| k.starts_with(&prefix))
        .map(|k| json!({ "key": k, "size_bytes": 10 }))
        .collect();
    (StatusCode::OK, Json(json!({ "objects": objects })))
}

async fn spawn_gateway() -> SocketAddr {
    let router = Router::new()
        .route("/v1/DescribeStep", post(describe_step))
        .route("/v1/AddSteps", post(add_steps))
        .route("/v1/ListInstanceGroups", post(list_groups))
        .route("/v1/ModifyInstanceGroups", post(modify))
        .route("/v1/TerminateClusters", post(terminate))
        .route("/v1/DescribeCluster", post(describe_cluster))
        .route("/v1/ListArtifacts", post(list_artifacts));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> HttpControlPlane {
    HttpControlPlane::new(&format!("http://{addr}"))
        .unwrap()
        .with_api_key("test-key")
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn describe_step_decodes_partial_payload() {
    let addr = spawn_gateway().await;
    let step = client(addr).describe_step("j-1", "s-1").await.unwrap();

    assert_eq!(step.id, "s-1");
    assert_eq!(step.status, StepStatus::Completed);
    assert!(step.timeline.started_at.is_some());
    assert!(step.timeline.ended_at.is_none());
    assert_eq!(step.log_location.as_deref(), Some("s3://logs/steps/s-1/"));
}

#[tokio::test]
async fn missing_step_is_not_found() {
    let addr = spawn_gateway().await;
    let result = client(addr).describe_step("j-1", "s-missing").await;
    assert_eq!(
        result,
        Err(RemoteError::NotFound("step s-missing not found".to_string()))
    );
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let addr = spawn_gateway().await;
    let anonymous = HttpControlPlane::new(&format!("http://{addr}")).unwrap();
    let result = anonymous.describe_step("j-1", "s-1").await;
    assert!(matches!(result, Err(RemoteError::Unauthorized(_))));
}

#[tokio::test]
async fn add_steps_round_trip_and_rejection() {
    let addr = spawn_gateway().await;
    let plane = client(addr);
    let step = StepConfig {
        name: "join".to_string(),
        action_on_failure: ActionOnFailure::Continue,
        jar: "command-runner.jar".to_string(),
        args: vec!["spark-submit".to_string()],
    };

    let ok = plane
        .add_steps(AddStepsRequest {
            cluster_id: "j-1".to_string(),
            steps: vec![step.clone()],
        })
        .await
        .unwrap();
    assert_eq!(ok.step_ids, vec!["s-1"]);

    let rejected = plane
        .add_steps(AddStepsRequest {
            cluster_id: "j-TERMINATED".to_string(),
            steps: vec![step],
        })
        .await;
    assert_eq!(
        rejected,
        Err(RemoteError::rejected("ValidationException", "cluster is terminated"))
    );
}

#[tokio::test]
async fn server_error_is_unavailable() {
    let addr = spawn_gateway().await;
    let result = client(addr)
        .modify_instance_groups(ModifyInstanceGroupsRequest {
            cluster_id: "j-1".to_string(),
            groups: vec![InstanceGroupModify {
                id: "ig-c".to_string(),
                count: 0,
            }],
        })
        .await;
    assert!(matches!(result, Err(RemoteError::Unavailable(m)) if m.contains("boom")));
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let addr = spawn_gateway().await;
    let result = client(addr).describe_cluster("j-1").await;
    assert!(matches!(result, Err(RemoteError::Decode(_))));
}

#[tokio::test]
async fn cluster_control_over_http() {
    let addr = spawn_gateway().await;
    let control = ClusterControl::new(Arc::new(client(addr)), ProvisioningSettings::default());
    let handle = ClusterHandle::new("j-1");

    let core = control
        .find_group(&handle, InstanceRole::Core)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(core.id, "ig-c");

    let ack = control
        .resize_instance_group(&handle, Some(&core.id), Some(1))
        .await
        .unwrap();
    assert!(matches!(ack, stepgrid_control::ResizeAck::Applied { count: 1, .. }));

    // 404 on terminate means the cluster is already gone.
    assert_eq!(
        control.terminate_cluster(&handle).await.unwrap(),
        TerminateAck::AlreadyTerminated
    );

    // A garbled describe surfaces as a query failure, not NotFound.
    assert!(matches!(
        control.describe_cluster(&handle).await,
        Err(ControlError::Query(RemoteError::Decode(_)))
    ));
}

#[tokio::test]
async fn list_artifacts_filters_by_prefix() {
    let addr = spawn_gateway().await;
    let objects = client(addr).list_artifacts("alaa-bucket", "jobs/").await.unwrap();
    let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["jobs/join.jar", "jobs/wordcount.py"]);
}
