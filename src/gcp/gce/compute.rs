//! The Compute Engine calls a migration depends on.
//!
//! [`GceClient`](crate::gcp::gce::GceClient) talks to the real REST API; tests
//! drive the workflow through an in-memory fake implementing the same trait.

use crate::error::Result;
use crate::gcp::gce::types::*;

#[allow(async_fn_in_trait)]
pub trait Compute {
    /// `instances.get`
    async fn get_instance(&self, project: &str, zone: &str, instance: &str) -> Result<Instance>;

    /// `instances.stop`
    async fn stop_instance(&self, project: &str, zone: &str, instance: &str)
    -> Result<Operation>;

    /// `instances.insert`
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> Result<Operation>;

    /// `instances.attachDisk`
    async fn attach_disk(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
        request: &AttachDiskRequest,
    ) -> Result<Operation>;

    /// One page of `instances.aggregatedList`.
    async fn list_instances_page(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<InstanceAggregatedList>;

    /// `snapshots.insert`
    async fn insert_snapshot(&self, project: &str, request: &SnapshotRequest)
    -> Result<Operation>;

    /// `images.insert`
    async fn insert_image(&self, project: &str, request: &ImageRequest) -> Result<Operation>;

    /// `images.setIamPolicy`. Completes synchronously, so no operation is returned.
    async fn set_image_iam_policy(
        &self,
        project: &str,
        image: &str,
        request: &SetPolicyRequest,
    ) -> Result<Policy>;

    /// `disks.insert`
    async fn insert_disk(&self, project: &str, zone: &str, request: &DiskRequest)
    -> Result<Operation>;

    /// `zoneOperations.get`
    async fn get_zone_operation(&self, project: &str, zone: &str, name: &str)
    -> Result<Operation>;

    /// `regionOperations.get`
    async fn get_region_operation(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation>;

    /// `globalOperations.get`
    async fn get_global_operation(&self, project: &str, name: &str) -> Result<Operation>;
}
