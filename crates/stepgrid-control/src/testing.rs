//! In-memory control plane for tests.
//!
//! [`MockControlPlane`] models cluster lifecycle, hands out ids, records
//! every request and call count, and replays a script of step states for
//! `describe_step`. Once the script runs dry every describe returns the
//! idle status (PENDING unless changed).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use stepgrid_core::{
    ClusterDescription, ClusterHandle, ClusterId, ClusterState, InstanceGroup, InstanceRole,
    StepDescription, StepHandle, StepId, StepStatus, StepTimeline,
};

use crate::error::RemoteError;
use crate::plane::{
    AddStepsRequest, AddStepsResponse, ArtifactObject, ArtifactStore, ControlPlane,
    ModifyInstanceGroupsRequest, RunClusterRequest, RunClusterResponse,
};

enum Scripted {
    Status(StepStatus),
    Description(StepDescription),
    Error(RemoteError),
}

struct MockCluster {
    description: ClusterDescription,
    groups: Vec<InstanceGroup>,
    steps: Vec<StepId>,
}

struct MockState {
    clusters: HashMap<ClusterId, MockCluster>,
    next_id: u32,
    script: VecDeque<Scripted>,
    idle_status: StepStatus,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, RemoteError>,
    omit_step_ids: bool,
    run_requests: Vec<RunClusterRequest>,
    modify_requests: Vec<ModifyInstanceGroupsRequest>,
    add_step_requests: Vec<AddStepsRequest>,
    artifacts: HashMap<String, Vec<ArtifactObject>>,
}

pub struct MockControlPlane {
    state: Mutex<MockState>,
    resize_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                clusters: HashMap::new(),
                next_id: 1,
                script: VecDeque::new(),
                idle_status: StepStatus::Pending,
                calls: HashMap::new(),
                failures: HashMap::new(),
                omit_step_ids: false,
                run_requests: Vec::new(),
                modify_requests: Vec::new(),
                add_step_requests: Vec::new(),
                artifacts: HashMap::new(),
            }),
            resize_gate: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Count the call and return the injected failure for `op`, if any.
    fn enter(&self, op: &'static str) -> Result<(), RemoteError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ── Setup ────────────────────────────────────────────────────

    /// Register a cluster with one MASTER and (if `core_count > 0`) one CORE group.
    ///
    /// Group ids are `ig-<cluster>-master` and `ig-<cluster>-core`.
    pub fn add_cluster(&self, id: &str, state: ClusterState, core_count: u32) -> ClusterHandle {
        let mut groups = vec![group(id, InstanceRole::Master, "m5.xlarge", 1)];
        if core_count > 0 {
            groups.push(group(id, InstanceRole::Core, "m5.xlarge", core_count));
        }
        self.state().clusters.insert(
            id.to_string(),
            MockCluster {
                description: ClusterDescription {
                    id: id.to_string(),
                    name: format!("{id}-name"),
                    state,
                    public_endpoint: Some(format!("{}.compute.internal", id.to_lowercase())),
                    log_uri: Some("s3://logs/".to_string()),
                    applications: vec!["Hadoop".to_string(), "Spark".to_string()],
                },
                groups,
                steps: Vec::new(),
            },
        );
        ClusterHandle::new(id)
    }

    /// Register a step on an existing cluster, as if it had been submitted.
    pub fn add_step(&self, cluster_id: &str, step_id: &str) -> StepHandle {
        if let Some(cluster) = self.state().clusters.get_mut(cluster_id) {
            cluster.steps.push(step_id.to_string());
        }
        StepHandle {
            step_id: step_id.to_string(),
            cluster_id: cluster_id.to_string(),
        }
    }

    pub fn set_cluster_state(&self, id: &str, state: ClusterState) {
        if let Some(cluster) = self.state().clusters.get_mut(id) {
            cluster.description.state = state;
        }
    }

    pub fn cluster_state(&self, id: &str) -> Option<ClusterState> {
        self.state().clusters.get(id).map(|c| c.description.state)
    }

    pub fn instance_groups(&self, id: &str) -> Vec<InstanceGroup> {
        self.state()
            .clusters
            .get(id)
            .map(|c| c.groups.clone())
            .unwrap_or_default()
    }

    /// Queue step states returned by successive `describe_step` calls.
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = StepStatus>) {
        let mut state = self.state();
        state
            .script
            .extend(statuses.into_iter().map(Scripted::Status));
    }

    /// Queue a verbatim step description (its id is replaced by the queried id).
    pub fn script_description(&self, description: StepDescription) {
        self.state().script.push_back(Scripted::Description(description));
    }

    /// Queue a failing `describe_step` call.
    pub fn script_error(&self, err: RemoteError) {
        self.state().script.push_back(Scripted::Error(err));
    }

    /// Status returned once the script is exhausted.
    pub fn set_idle_status(&self, status: StepStatus) {
        self.state().idle_status = status;
    }

    /// Fail the next call to `op` (the trait method name) with `err`.
    pub fn fail_next(&self, op: &'static str, err: RemoteError) {
        self.state().failures.insert(op, err);
    }

    /// Make `add_steps` succeed with an empty id list.
    pub fn omit_step_ids(&self) {
        self.state().omit_step_ids = true;
    }

    /// Block `modify_instance_groups` until the returned handle is notified.
    pub fn hold_resizes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.resize_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release_resizes(&self) {
        *self.resize_gate.lock().unwrap() = None;
    }

    pub fn add_artifacts(&self, bucket: &str, keys: &[&str]) {
        let objects = keys
            .iter()
            .map(|k| ArtifactObject {
                key: k.to_string(),
                size_bytes: Some(1024),
            })
            .collect();
        self.state().artifacts.insert(bucket.to_string(), objects);
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Number of calls made to a trait method, by name.
    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    pub fn run_requests(&self) -> Vec<RunClusterRequest> {
        self.state().run_requests.clone()
    }

    pub fn modify_requests(&self) -> Vec<ModifyInstanceGroupsRequest> {
        self.state().modify_requests.clone()
    }

    pub fn add_step_requests(&self) -> Vec<AddStepsRequest> {
        self.state().add_step_requests.clone()
    }

    /// A plausible description for a step in `status`: timestamps and the
    /// log location are filled in as far as the status implies.
    pub fn description(step_id: &str, status: StepStatus) -> StepDescription {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single();
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 0).single();
        let ended = Utc.with_ymd_and_hms(2024, 3, 1, 12, 9, 30).single();
        let has_started = !matches!(status, StepStatus::Pending);
        StepDescription {
            id: step_id.to_string(),
            name: format!("{step_id}-name"),
            status,
            timeline: StepTimeline {
                created_at: created,
                started_at: if has_started { started } else { None },
                ended_at: if status.is_server_terminal() { ended } else { None },
            },
            log_location: has_started.then(|| format!("s3://logs/steps/{step_id}/")),
            failure_reason: (status == StepStatus::Failed)
                .then(|| "Step failed with exitCode 1".to_string()),
        }
    }
}

fn group(cluster_id: &str, role: InstanceRole, instance_type: &str, count: u32) -> InstanceGroup {
    InstanceGroup {
        id: format!("ig-{cluster_id}-{}", role.label().to_lowercase()),
        role,
        instance_type: instance_type.to_string(),
        requested_count: count,
        running_count: count,
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn run_cluster(&self, req: RunClusterRequest) -> Result<RunClusterResponse, RemoteError> {
        self.enter("run_cluster")?;
        let mut state = self.state();
        let id = format!("j-MOCK{:04}", state.next_id);
        state.next_id += 1;

        let groups = req
            .instances
            .groups
            .iter()
            .map(|g| group(&id, g.role, &g.instance_type, g.count))
            .collect();
        state.clusters.insert(
            id.clone(),
            MockCluster {
                description: ClusterDescription {
                    id: id.clone(),
                    name: req.name.clone(),
                    state: ClusterState::Waiting,
                    public_endpoint: None,
                    log_uri: Some(req.log_uri.clone()),
                    applications: req.applications.clone(),
                },
                groups,
                steps: Vec::new(),
            },
        );
        state.run_requests.push(req);
        Ok(RunClusterResponse { cluster_id: id })
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, RemoteError> {
        self.enter("describe_cluster")?;
        self.state()
            .clusters
            .get(cluster_id)
            .map(|c| c.description.clone())
            .ok_or_else(|| RemoteError::NotFound(cluster_id.to_string()))
    }

    async fn list_instance_groups(&self, cluster_id: &str) -> Result<Vec<InstanceGroup>, RemoteError> {
        self.enter("list_instance_groups")?;
        self.state()
            .clusters
            .get(cluster_id)
            .map(|c| c.groups.clone())
            .ok_or_else(|| RemoteError::NotFound(cluster_id.to_string()))
    }

    async fn modify_instance_groups(&self, req: ModifyInstanceGroupsRequest) -> Result<(), RemoteError> {
        self.enter("modify_instance_groups")?;
        let gate = self.resize_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state();
        state.modify_requests.push(req.clone());
        let cluster = state
            .clusters
            .get_mut(&req.cluster_id)
            .ok_or_else(|| RemoteError::NotFound(req.cluster_id.clone()))?;
        for change in &req.groups {
            let group = cluster
                .groups
                .iter_mut()
                .find(|g| g.id == change.id)
                .ok_or_else(|| RemoteError::NotFound(change.id.clone()))?;
            group.requested_count = change.count;
        }
        Ok(())
    }

    async fn add_steps(&self, req: AddStepsRequest) -> Result<AddStepsResponse, RemoteError> {
        self.enter("add_steps")?;
        let mut state = self.state();
        state.add_step_requests.push(req.clone());

        let omit = state.omit_step_ids;
        let first_id = state.next_id;
        let cluster = state
            .clusters
            .get_mut(&req.cluster_id)
            .ok_or_else(|| RemoteError::NotFound(req.cluster_id.clone()))?;
        let cluster_state = cluster.description.state;
        if !cluster_state.accepts_steps() {
            return Err(RemoteError::rejected(
                "ValidationException",
                format!("cluster {} is {cluster_state} and does not accept steps", req.cluster_id),
            ));
        }
        if omit {
            return Ok(AddStepsResponse { step_ids: Vec::new() });
        }

        let step_ids: Vec<StepId> = (0..req.steps.len() as u32)
            .map(|i| format!("s-MOCK{:04}", first_id + i))
            .collect();
        cluster.steps.extend(step_ids.iter().cloned());
        state.next_id += req.steps.len() as u32;
        Ok(AddStepsResponse { step_ids })
    }

    async fn describe_step(&self, cluster_id: &str, step_id: &str) -> Result<StepDescription, RemoteError> {
        self.enter("describe_step")?;
        let mut state = self.state();
        let known = state
            .clusters
            .get(cluster_id)
            .is_some_and(|c| c.steps.iter().any(|s| s == step_id));
        if !known {
            return Err(RemoteError::NotFound(format!("{cluster_id}/{step_id}")));
        }

        match state.script.pop_front() {
            Some(Scripted::Status(status)) => Ok(Self::description(step_id, status)),
            Some(Scripted::Description(mut description)) => {
                description.id = step_id.to_string();
                Ok(description)
            }
            Some(Scripted::Error(err)) => Err(err),
            None => Ok(Self::description(step_id, state.idle_status)),
        }
    }

    async fn terminate_clusters(&self, cluster_ids: Vec<ClusterId>) -> Result<(), RemoteError> {
        self.enter("terminate_clusters")?;
        let mut state = self.state();
        for id in &cluster_ids {
            let cluster = state
                .clusters
                .get_mut(id)
                .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
            cluster.description.state = ClusterState::Terminated;
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for MockControlPlane {
    async fn list_artifacts(&self, bucket: &str, prefix: &str) -> Result<Vec<ArtifactObject>, RemoteError> {
        self.enter("list_artifacts")?;
        let state = self.state();
        let objects = state
            .artifacts
            .get(bucket)
            .ok_or_else(|| RemoteError::NotFound(bucket.to_string()))?;
        Ok(objects
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
