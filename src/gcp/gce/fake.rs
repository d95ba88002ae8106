//! In-memory control plane used by tests.
//!
//! Every call is recorded. Mutating calls return a fresh operation that reports
//! `RUNNING` for a configurable number of polls before `DONE`. Failures are
//! scripted with predicates over the recorded [`Call`].

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::gcp::gce::compute::Compute;
use crate::gcp::gce::types::*;

const SELF_LINK_BASE: &str = "https://www.googleapis.com/compute/v1";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetInstance { project: String, zone: String, instance: String },
    StopInstance { project: String, zone: String, instance: String },
    InsertInstance { project: String, zone: String, request: InstanceRequest },
    AttachDisk { project: String, zone: String, instance: String, source: String },
    ListInstances { project: String, filter: String, page_token: Option<String> },
    InsertSnapshot { project: String, request: SnapshotRequest },
    InsertImage { project: String, request: ImageRequest },
    SetImageIamPolicy { project: String, image: String, request: SetPolicyRequest },
    InsertDisk { project: String, zone: String, request: DiskRequest },
    GetZoneOperation { project: String, zone: String, name: String },
    GetRegionOperation { project: String, region: String, name: String },
    GetGlobalOperation { project: String, name: String },
}

impl Call {
    pub fn is_poll(&self) -> bool {
        matches!(
            self,
            Call::GetZoneOperation { .. }
                | Call::GetRegionOperation { .. }
                | Call::GetGlobalOperation { .. }
        )
    }
}

type Predicate = Box<dyn Fn(&Call) -> bool + Send>;

struct SubmitFailure {
    matches: Predicate,
    status: u16,
    body: String,
    remaining: u32,
}

struct OperationFailure {
    matches: Predicate,
    error: OperationError,
}

struct PendingOperation {
    operation: Operation,
    remaining_polls: u32,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    instances: HashMap<(String, String), Instance>,
    pages: Vec<InstanceAggregatedList>,
    operations: HashMap<String, PendingOperation>,
    next_operation: u32,
    polls_before_done: u32,
    never_finish: bool,
    submit_failures: Vec<SubmitFailure>,
    operation_failures: Vec<OperationFailure>,
}

#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<State>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, instance: Instance) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let zone = crate::last_segment(&instance.zone).to_string();
            state.instances.insert((zone, instance.name.clone()), instance);
        }
        self
    }

    /// Pages served by `list_instances_page`; page `i > 0` is requested with token `page-i`.
    pub fn with_pages(self, mut pages: Vec<InstanceAggregatedList>) -> Self {
        let count = pages.len();
        for (i, page) in pages.iter_mut().enumerate() {
            page.next_page_token = (i + 1 < count).then(|| format!("page-{}", i + 1));
        }
        self.state.lock().unwrap().pages = pages;
        self
    }

    pub fn polls_before_done(self, polls: u32) -> Self {
        self.state.lock().unwrap().polls_before_done = polls;
        self
    }

    pub fn never_finish(self) -> Self {
        self.state.lock().unwrap().never_finish = true;
        self
    }

    /// Rejects the first `times` matching submissions with an HTTP error.
    pub fn fail_submit_times(
        self,
        matches: impl Fn(&Call) -> bool + Send + 'static,
        status: u16,
        body: &str,
        times: u32,
    ) -> Self {
        self.state.lock().unwrap().submit_failures.push(SubmitFailure {
            matches: Box::new(matches),
            status,
            body: body.to_string(),
            remaining: times,
        });
        self
    }

    /// Operations created by matching submissions finish with an error payload.
    pub fn fail_operation(
        self,
        matches: impl Fn(&Call) -> bool + Send + 'static,
        code: &str,
    ) -> Self {
        self.state.lock().unwrap().operation_failures.push(OperationFailure {
            matches: Box::new(matches),
            error: OperationError {
                errors: vec![OperationErrorItem {
                    code: code.to_string(),
                    message: format!("{} (injected)", code),
                    location: None,
                }],
            },
        });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded calls other than operation polls.
    pub fn requests(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| !c.is_poll()).collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        for failure in state.submit_failures.iter_mut() {
            if !(failure.matches)(&call) {
                continue;
            }
            if failure.remaining == 0 {
                continue;
            }
            failure.remaining -= 1;
            return Err(Error::Api {
                method: "POST".to_string(),
                url: format!("fake://{:?}", call),
                status: failure.status,
                body: failure.body.clone(),
            });
        }
        Ok(())
    }

    fn submit(&self, call: Call, project: &str, zone: Option<&str>) -> Result<Operation> {
        self.record(call.clone())?;
        let mut state = self.state.lock().unwrap();
        state.next_operation += 1;
        let name = format!("operation-{}", state.next_operation);
        let error = state
            .operation_failures
            .iter()
            .find(|f| (f.matches)(&call))
            .map(|f| f.error.clone());
        let operation = Operation {
            name: name.clone(),
            zone: zone.map(|z| format!("{}/projects/{}/zones/{}", SELF_LINK_BASE, project, z)),
            status: "PENDING".to_string(),
            error,
            ..Default::default()
        };
        let remaining_polls = state.polls_before_done;
        state.operations.insert(
            name,
            PendingOperation {
                operation: operation.clone(),
                remaining_polls,
            },
        );
        let mut handle = operation;
        handle.error = None;
        Ok(handle)
    }

    fn poll(&self, call: Call, name: &str) -> Result<Operation> {
        self.record(call)?;
        let mut state = self.state.lock().unwrap();
        let never_finish = state.never_finish;
        let Some(pending) = state.operations.get_mut(name) else {
            return Err(Error::Api {
                method: "GET".to_string(),
                url: format!("fake://operations/{}", name),
                status: 404,
                body: "operation not found".to_string(),
            });
        };
        let mut operation = pending.operation.clone();
        if never_finish || pending.remaining_polls > 0 {
            pending.remaining_polls = pending.remaining_polls.saturating_sub(1);
            operation.status = "RUNNING".to_string();
            operation.error = None;
        } else {
            operation.status = STATUS_DONE.to_string();
        }
        Ok(operation)
    }
}

impl Compute for FakeCompute {
    async fn get_instance(&self, project: &str, zone: &str, instance: &str) -> Result<Instance> {
        self.record(Call::GetInstance {
            project: project.to_string(),
            zone: zone.to_string(),
            instance: instance.to_string(),
        })?;
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(&(zone.to_string(), instance.to_string()))
            .cloned()
            .ok_or_else(|| Error::Api {
                method: "GET".to_string(),
                url: format!("fake://instances/{}", instance),
                status: 404,
                body: "instance not found".to_string(),
            })
    }

    async fn stop_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
    ) -> Result<Operation> {
        let call = Call::StopInstance {
            project: project.to_string(),
            zone: zone.to_string(),
            instance: instance.to_string(),
        };
        self.submit(call, project, Some(zone))
    }

    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> Result<Operation> {
        let call = Call::InsertInstance {
            project: project.to_string(),
            zone: zone.to_string(),
            request: request.clone(),
        };
        self.submit(call, project, Some(zone))
    }

    async fn attach_disk(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
        request: &AttachDiskRequest,
    ) -> Result<Operation> {
        let call = Call::AttachDisk {
            project: project.to_string(),
            zone: zone.to_string(),
            instance: instance.to_string(),
            source: request.source.clone(),
        };
        self.submit(call, project, Some(zone))
    }

    async fn list_instances_page(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<InstanceAggregatedList> {
        self.record(Call::ListInstances {
            project: project.to_string(),
            filter: filter.to_string(),
            page_token: page_token.map(str::to_string),
        })?;
        let mut state = self.state.lock().unwrap();
        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|i| i.parse::<usize>().ok())
                .unwrap_or(usize::MAX),
        };
        if index >= state.pages.len() {
            return Ok(InstanceAggregatedList::default());
        }
        Ok(std::mem::take(&mut state.pages[index]))
    }

    async fn insert_snapshot(
        &self,
        project: &str,
        request: &SnapshotRequest,
    ) -> Result<Operation> {
        let call = Call::InsertSnapshot {
            project: project.to_string(),
            request: request.clone(),
        };
        self.submit(call, project, None)
    }

    async fn insert_image(&self, project: &str, request: &ImageRequest) -> Result<Operation> {
        let call = Call::InsertImage {
            project: project.to_string(),
            request: request.clone(),
        };
        self.submit(call, project, None)
    }

    async fn set_image_iam_policy(
        &self,
        project: &str,
        image: &str,
        request: &SetPolicyRequest,
    ) -> Result<Policy> {
        self.record(Call::SetImageIamPolicy {
            project: project.to_string(),
            image: image.to_string(),
            request: request.clone(),
        })?;
        Ok(request.policy.clone())
    }

    async fn insert_disk(
        &self,
        project: &str,
        zone: &str,
        request: &DiskRequest,
    ) -> Result<Operation> {
        let call = Call::InsertDisk {
            project: project.to_string(),
            zone: zone.to_string(),
            request: request.clone(),
        };
        self.submit(call, project, Some(zone))
    }

    async fn get_zone_operation(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation> {
        let call = Call::GetZoneOperation {
            project: project.to_string(),
            zone: zone.to_string(),
            name: name.to_string(),
        };
        self.poll(call, name)
    }

    async fn get_region_operation(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation> {
        let call = Call::GetRegionOperation {
            project: project.to_string(),
            region: region.to_string(),
            name: name.to_string(),
        };
        self.poll(call, name)
    }

    async fn get_global_operation(&self, project: &str, name: &str) -> Result<Operation> {
        let call = Call::GetGlobalOperation {
            project: project.to_string(),
            name: name.to_string(),
        };
        self.poll(call, name)
    }
}

/// Builds an instance in `project`/`zone` with the given `(disk name, boot)` list.
pub fn instance(
    project: &str,
    zone: &str,
    name: &str,
    machine_type: &str,
    disks: &[(&str, bool)],
) -> Instance {
    Instance {
        name: name.to_string(),
        zone: format!("{}/projects/{}/zones/{}", SELF_LINK_BASE, project, zone),
        machine_type: format!(
            "{}/projects/{}/zones/{}/machineTypes/{}",
            SELF_LINK_BASE, project, zone, machine_type
        ),
        disks: disks
            .iter()
            .enumerate()
            .map(|(i, (disk, boot))| AttachedDisk {
                source: Some(format!(
                    "{}/projects/{}/zones/{}/disks/{}",
                    SELF_LINK_BASE, project, zone, disk
                )),
                boot: *boot,
                device_name: Some(disk.to_string()),
                index: Some(i as u32),
            })
            .collect(),
    }
}
