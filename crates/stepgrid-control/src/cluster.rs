//! Cluster control client — create, describe, resize and terminate clusters.
//!
//! A thin facade over [`ControlPlane`] that turns raw [`RemoteError`]s into
//! the [`ControlError`] taxonomy. Nothing here retries: a failed create is
//! reported immediately because retrying it could provision a duplicate
//! cluster, and resize/terminate are not idempotent across retries.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stepgrid_core::config::ClusterDefaults;
use stepgrid_core::{ClusterDescription, ClusterHandle, ClusterSpec, InstanceGroup, InstanceRole};

use crate::error::{ControlError, ControlResult, RemoteError};
use crate::plane::{
    Configuration, ControlPlane, InstanceGroupConfig, InstanceGroupModify, InstancesConfig,
    Market, ModifyInstanceGroupsRequest, RunClusterRequest,
};

/// Account-level settings applied to every cluster this client creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningSettings {
    pub job_flow_role: String,
    pub service_role: String,
    pub pyspark_python: String,
    pub applications: Vec<String>,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self::from(&ClusterDefaults::default())
    }
}

impl From<&ClusterDefaults> for ProvisioningSettings {
    fn from(defaults: &ClusterDefaults) -> Self {
        Self {
            job_flow_role: defaults.job_flow_role.clone(),
            service_role: defaults.service_role.clone(),
            pyspark_python: defaults.pyspark_python.clone(),
            applications: defaults.applications.clone(),
        }
    }
}

/// Result of a resize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResizeAck {
    /// The control plane accepted the new count.
    Applied { group_id: String, count: u32 },
    /// Group id or count was missing or zero; nothing was sent.
    Skipped,
}

/// Result of a terminate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateAck {
    Terminated,
    AlreadyTerminated,
}

/// Client for cluster-level operations.
#[derive(Clone)]
pub struct ClusterControl {
    plane: Arc<dyn ControlPlane>,
    settings: ProvisioningSettings,
    /// Instance groups with a resize in flight through this client.
    resizing: Arc<Mutex<HashSet<String>>>,
}

impl ClusterControl {
    pub fn new(plane: Arc<dyn ControlPlane>, settings: ProvisioningSettings) -> Self {
        Self {
            plane,
            settings,
            resizing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The underlying control plane, shared with the step submitter and poller.
    pub fn plane(&self) -> Arc<dyn ControlPlane> {
        self.plane.clone()
    }

    /// Create a cluster with one MASTER node and `spec.core_count` CORE nodes.
    pub async fn create_cluster(&self, spec: &ClusterSpec) -> ControlResult<ClusterHandle> {
        let request = self.build_run_request(spec);
        let response = self
            .plane
            .run_cluster(request)
            .await
            .map_err(ControlError::Provisioning)?;

        if response.cluster_id.is_empty() {
            return Err(ControlError::Provisioning(RemoteError::Decode(
                "control plane returned an empty cluster id".to_string(),
            )));
        }

        info!(
            cluster_id = %response.cluster_id,
            name = %spec.name,
            core_count = spec.core_count,
            instance_type = %spec.instance_type,
            "cluster created"
        );
        Ok(ClusterHandle::new(response.cluster_id))
    }

    /// Read-only snapshot of a live cluster.
    pub async fn describe_cluster(&self, handle: &ClusterHandle) -> ControlResult<ClusterDescription> {
        let description = self
            .plane
            .describe_cluster(&handle.cluster_id)
            .await
            .map_err(|e| lookup_error(handle, e))?;

        if description.state.is_terminated() {
            return Err(ControlError::NotFound(format!(
                "cluster {handle} is {}",
                description.state
            )));
        }
        Ok(description)
    }

    /// Instance groups of a cluster, in no particular order.
    pub async fn list_instance_groups(&self, handle: &ClusterHandle) -> ControlResult<Vec<InstanceGroup>> {
        self.plane
            .list_instance_groups(&handle.cluster_id)
            .await
            .map_err(|e| lookup_error(handle, e))
    }

    /// First group with the given role, if any.
    pub async fn find_group(
        &self,
        handle: &ClusterHandle,
        role: InstanceRole,
    ) -> ControlResult<Option<InstanceGroup>> {
        let groups = self.list_instance_groups(handle).await?;
        Ok(groups.into_iter().find(|g| g.role == role))
    }

    /// Resize one instance group.
    ///
    /// Both `group_id` and `new_count` must be present and non-zero, or the
    /// call is skipped without contacting the control plane. A second resize
    /// of the same group while the first is in flight is rejected.
    pub async fn resize_instance_group(
        &self,
        handle: &ClusterHandle,
        group_id: Option<&str>,
        new_count: Option<u32>,
    ) -> ControlResult<ResizeAck> {
        let (group_id, count) = match (
            group_id.filter(|g| !g.is_empty()),
            new_count.filter(|c| *c > 0),
        ) {
            (Some(g), Some(c)) => (g, c),
            _ => {
                debug!(cluster_id = %handle, ?group_id, ?new_count, "resize skipped, group or count missing");
                return Ok(ResizeAck::Skipped);
            }
        };

        let _guard = ResizeGuard::acquire(&self.resizing, group_id)?;

        let request = ModifyInstanceGroupsRequest {
            cluster_id: handle.cluster_id.clone(),
            groups: vec![InstanceGroupModify {
                id: group_id.to_string(),
                count,
            }],
        };

        self.plane
            .modify_instance_groups(request)
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(what) => ControlError::NotFound(what),
                other => ControlError::Provisioning(other),
            })?;

        info!(cluster_id = %handle, %group_id, count, "instance group resized");
        Ok(ResizeAck::Applied {
            group_id: group_id.to_string(),
            count,
        })
    }

    /// Terminate a cluster. Terminating an unknown or already-terminated
    /// cluster is reported as `AlreadyTerminated`, not as an error.
    pub async fn terminate_cluster(&self, handle: &ClusterHandle) -> ControlResult<TerminateAck> {
        match self
            .plane
            .terminate_clusters(vec![handle.cluster_id.clone()])
            .await
        {
            Ok(()) => {
                info!(cluster_id = %handle, "cluster terminated");
                Ok(TerminateAck::Terminated)
            }
            Err(RemoteError::NotFound(what)) => {
                warn!(cluster_id = %handle, %what, "cluster already terminated");
                Ok(TerminateAck::AlreadyTerminated)
            }
            Err(e) => Err(ControlError::Provisioning(e)),
        }
    }

    /// Build the provisioning request for a cluster spec.
    pub fn build_run_request(&self, spec: &ClusterSpec) -> RunClusterRequest {
        let group = |name: &str, role: InstanceRole, count: u32| InstanceGroupConfig {
            name: name.to_string(),
            market: Market::OnDemand,
            role,
            instance_type: spec.instance_type.clone(),
            count,
        };

        let python_export = Configuration {
            classification: "export".to_string(),
            properties: BTreeMap::from([(
                "PYSPARK_PYTHON".to_string(),
                self.settings.pyspark_python.clone(),
            )]),
            configurations: Vec::new(),
        };

        RunClusterRequest {
            name: spec.name.clone(),
            log_uri: spec.log_uri.clone(),
            release_label: spec.release_label.clone(),
            instances: InstancesConfig {
                groups: vec![
                    group("Master node", InstanceRole::Master, 1),
                    group("Core nodes", InstanceRole::Core, spec.core_count),
                ],
                keep_alive_when_no_steps: true,
                termination_protected: false,
                key_name: spec.key_name.clone(),
            },
            applications: self.settings.applications.clone(),
            configurations: vec![Configuration {
                classification: "spark-env".to_string(),
                properties: BTreeMap::new(),
                configurations: vec![python_export],
            }],
            visible_to_all_users: true,
            job_flow_role: self.settings.job_flow_role.clone(),
            service_role: self.settings.service_role.clone(),
        }
    }
}

fn lookup_error(handle: &ClusterHandle, err: RemoteError) -> ControlError {
    match err {
        RemoteError::NotFound(_) => ControlError::NotFound(format!("cluster {handle}")),
        other => ControlError::Query(other),
    }
}

/// Marks an instance group as being resized until dropped.
struct ResizeGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    group_id: String,
}

impl ResizeGuard {
    fn acquire(registry: &Arc<Mutex<HashSet<String>>>, group_id: &str) -> ControlResult<Self> {
        let mut in_flight = registry.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(group_id.to_string()) {
            return Err(ControlError::ResizeInFlight(group_id.to_string()));
        }
        Ok(Self {
            registry: registry.clone(),
            group_id: group_id.to_string(),
        })
    }
}

impl Drop for ResizeGuard {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.group_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockControlPlane;
    use stepgrid_core::ClusterState;

    fn spec(core_count: u32) -> ClusterSpec {
        ClusterSpec {
            name: "nightly-join".to_string(),
            log_uri: "s3://logs/".to_string(),
            release_label: "emr-6.10.0".to_string(),
            instance_type: "m5.xlarge".to_string(),
            core_count,
            key_name: "ops-key".to_string(),
        }
    }

    fn client(mock: &Arc<MockControlPlane>) -> ClusterControl {
        ClusterControl::new(mock.clone(), ProvisioningSettings::default())
    }

    #[test]
    fn run_request_has_one_master_and_core_groups() {
        let mock = Arc::new(MockControlPlane::new());
        let req = client(&mock).build_run_request(&spec(3));

        assert_eq!(req.instances.groups.len(), 2);
        let master = &req.instances.groups[0];
        assert_eq!(master.role, InstanceRole::Master);
        assert_eq!(master.count, 1);
        assert_eq!(master.market, Market::OnDemand);
        let core = &req.instances.groups[1];
        assert_eq!(core.role, InstanceRole::Core);
        assert_eq!(core.count, 3);
        assert_eq!(core.market, Market::OnDemand);

        assert!(req.instances.keep_alive_when_no_steps);
        assert!(!req.instances.termination_protected);
        assert!(req.visible_to_all_users);
        assert_eq!(req.applications, vec!["Hadoop", "Spark"]);
        assert_eq!(req.job_flow_role, "EMR_for_EC2_role");
        assert_eq!(req.service_role, "EMR_ROLE");
        assert_eq!(req.configurations[0].classification, "spark-env");
        assert_eq!(
            req.configurations[0].configurations[0].properties["PYSPARK_PYTHON"],
            "/usr/bin/python3"
        );
    }

    #[tokio::test]
    async fn create_rejection_is_provisioning_error_and_not_retried() {
        let mock = Arc::new(MockControlPlane::new());
        mock.fail_next("run_cluster", RemoteError::rejected("ValidationException", "bad instance type"));

        let result = client(&mock).create_cluster(&spec(2)).await;
        assert!(matches!(result, Err(ControlError::Provisioning(RemoteError::Rejected { .. }))));
        assert_eq!(mock.calls("run_cluster"), 1);
    }

    #[tokio::test]
    async fn describe_terminated_cluster_is_not_found() {
        let mock = Arc::new(MockControlPlane::new());
        mock.add_cluster("j-OLD", ClusterState::Terminated, 1);

        let result = client(&mock).describe_cluster(&ClusterHandle::new("j-OLD")).await;
        assert!(matches!(result, Err(ControlError::NotFound(_))));
    }

    #[tokio::test]
    async fn describe_unknown_cluster_is_not_found() {
        let mock = Arc::new(MockControlPlane::new());
        let result = client(&mock).describe_cluster(&ClusterHandle::new("j-NOPE")).await;
        assert!(matches!(result, Err(ControlError::NotFound(_))));
    }

    #[tokio::test]
    async fn resize_skips_without_group_or_count() {
        let mock = Arc::new(MockControlPlane::new());
        let handle = mock.add_cluster("j-1", ClusterState::Waiting, 2);
        let control = client(&mock);

        let acks = [
            control.resize_instance_group(&handle, None, Some(2)).await.unwrap(),
            control.resize_instance_group(&handle, Some("ig-core"), None).await.unwrap(),
            control.resize_instance_group(&handle, Some("ig-core"), Some(0)).await.unwrap(),
            control.resize_instance_group(&handle, Some(""), Some(3)).await.unwrap(),
        ];
        assert!(acks.iter().all(|a| *a == ResizeAck::Skipped));
        assert_eq!(mock.calls("modify_instance_groups"), 0);
    }

    #[tokio::test]
    async fn resize_rejection_is_provisioning_error() {
        let mock = Arc::new(MockControlPlane::new());
        let handle = mock.add_cluster("j-1", ClusterState::Waiting, 2);
        mock.fail_next("modify_instance_groups", RemoteError::rejected("ValidationException", "below minimum"));

        let result = client(&mock)
            .resize_instance_group(&handle, Some("ig-j-1-core"), Some(1))
            .await;
        assert!(matches!(result, Err(ControlError::Provisioning(_))));
    }

    #[tokio::test]
    async fn concurrent_resize_of_same_group_is_rejected() {
        let mock = Arc::new(MockControlPlane::new());
        let handle = mock.add_cluster("j-1", ClusterState::Waiting, 2);
        let gate = mock.hold_resizes();
        let control = client(&mock);

        let first = {
            let control = control.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                control
                    .resize_instance_group(&handle, Some("ig-j-1-core"), Some(4))
                    .await
            })
        };

        // Wait until the first resize has reached the control plane.
        while mock.calls("modify_instance_groups") == 0 {
            tokio::task::yield_now().await;
        }

        let second = control
            .resize_instance_group(&handle, Some("ig-j-1-core"), Some(5))
            .await;
        assert!(matches!(second, Err(ControlError::ResizeInFlight(g)) if g == "ig-j-1-core"));

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(
            first,
            ResizeAck::Applied {
                group_id: "ig-j-1-core".to_string(),
                count: 4
            }
        );

        // The guard is released once the first resize finishes.
        mock.release_resizes();
        let third = control
            .resize_instance_group(&handle, Some("ig-j-1-core"), Some(2))
            .await
            .unwrap();
        assert!(matches!(third, ResizeAck::Applied { count: 2, .. }));
    }

    #[tokio::test]
    async fn terminating_gone_clusters_is_not_fatal() {
        let mock = Arc::new(MockControlPlane::new());
        let handle = mock.add_cluster("j-1", ClusterState::Waiting, 2);
        let control = client(&mock);

        assert_eq!(control.terminate_cluster(&handle).await.unwrap(), TerminateAck::Terminated);
        assert_eq!(mock.cluster_state("j-1"), Some(ClusterState::Terminated));
        assert!(control.terminate_cluster(&handle).await.is_ok());
        assert_eq!(
            control.terminate_cluster(&ClusterHandle::new("j-GONE")).await.unwrap(),
            TerminateAck::AlreadyTerminated
        );
    }
}
