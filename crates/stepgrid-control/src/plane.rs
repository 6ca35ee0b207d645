//! The remote control plane boundary.
//!
//! [`ControlPlane`] is the only way StepGrid talks to the outside world.
//! Each method is one remote procedure call with its own failure domain;
//! the request and response records below are its contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use stepgrid_core::{
    ActionOnFailure, ClusterDescription, ClusterId, InstanceGroup, InstanceGroupId,
    InstanceRole, StepDescription, StepId,
};

use crate::error::RemoteError;

/// Purchase option for an instance group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    OnDemand,
    Spot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroupConfig {
    pub name: String,
    pub market: Market,
    pub role: InstanceRole,
    pub instance_type: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesConfig {
    pub groups: Vec<InstanceGroupConfig>,
    pub keep_alive_when_no_steps: bool,
    pub termination_protected: bool,
    pub key_name: String,
}

/// A configuration classification applied on every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub classification: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<Configuration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunClusterRequest {
    pub name: String,
    pub log_uri: String,
    pub release_label: String,
    pub instances: InstancesConfig,
    pub applications: Vec<String>,
    pub configurations: Vec<Configuration>,
    pub visible_to_all_users: bool,
    pub job_flow_role: String,
    pub service_role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunClusterResponse {
    pub cluster_id: ClusterId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroupModify {
    pub id: InstanceGroupId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyInstanceGroupsRequest {
    pub cluster_id: ClusterId,
    pub groups: Vec<InstanceGroupModify>,
}

/// One step as sent to the control plane: a jar invocation with arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub action_on_failure: ActionOnFailure,
    pub jar: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStepsRequest {
    pub cluster_id: ClusterId,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStepsResponse {
    #[serde(default)]
    pub step_ids: Vec<StepId>,
}

/// An object listed from the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactObject {
    pub key: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// Remote provisioning and step API.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn run_cluster(&self, req: RunClusterRequest) -> Result<RunClusterResponse, RemoteError>;

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, RemoteError>;

    async fn list_instance_groups(&self, cluster_id: &str) -> Result<Vec<InstanceGroup>, RemoteError>;

    async fn modify_instance_groups(&self, req: ModifyInstanceGroupsRequest) -> Result<(), RemoteError>;

    async fn add_steps(&self, req: AddStepsRequest) -> Result<AddStepsResponse, RemoteError>;

    async fn describe_step(&self, cluster_id: &str, step_id: &str) -> Result<StepDescription, RemoteError>;

    async fn terminate_clusters(&self, cluster_ids: Vec<ClusterId>) -> Result<(), RemoteError>;
}

/// Read-only view of the artifact store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn list_artifacts(&self, bucket: &str, prefix: &str) -> Result<Vec<ArtifactObject>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_steps_response_without_ids_decodes_empty() {
        let resp: AddStepsResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.step_ids.is_empty());
    }

    #[test]
    fn configuration_omits_empty_members() {
        let conf = Configuration {
            classification: "spark-env".to_string(),
            properties: BTreeMap::new(),
            configurations: vec![Configuration {
                classification: "export".to_string(),
                properties: [("PYSPARK_PYTHON".to_string(), "/usr/bin/python3".to_string())]
                    .into_iter()
                    .collect(),
                configurations: Vec::new(),
            }],
        };
        let json = serde_json::to_value(&conf).unwrap();
        assert!(json.get("properties").is_none());
        assert_eq!(
            json["configurations"][0]["properties"]["PYSPARK_PYTHON"],
            "/usr/bin/python3"
        );
    }

    #[test]
    fn market_wire_name() {
        assert_eq!(
            serde_json::to_string(&Market::OnDemand).unwrap(),
            "\"ON_DEMAND\""
        );
    }
}
