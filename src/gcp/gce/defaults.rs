//! # GCE Request Builders
//!
//! This module provides helper functions to construct the request bodies a
//! migration submits, filling in the resource paths Compute Engine expects.

use crate::gcp::gce::types::*;

/// Role that lets a principal create disks from an image.
pub const IMAGE_USER_ROLE: &str = "roles/compute.imageUser";

/// Domain of the Compute Engine system service agents.
pub const SERVICE_AGENT_DOMAIN: &str = "compute-system.iam.gserviceaccount.com";

/// Infers the region from a zone name (`us-central1-a` -> `us-central1`).
pub fn region_of(zone: &str) -> &str {
    zone.rsplit_once('-')
        .map(|(prefix, _)| prefix)
        .unwrap_or(zone)
}

/// IAM member for the Compute Engine service agent of the project with the given number.
pub fn service_agent_member(project_number: &str) -> String {
    format!(
        "serviceAccount:service-{}@{}",
        project_number, SERVICE_AGENT_DOMAIN
    )
}

/// Full resource path of a global image, usable from other projects once shared.
pub fn image_path(project_id: &str, image: &str) -> String {
    format!("projects/{}/global/images/{}", project_id, image)
}

/// Full resource path of a zonal disk.
pub fn disk_path(project_id: &str, zone: &str, disk: &str) -> String {
    format!("projects/{}/zones/{}/disks/{}", project_id, zone, disk)
}

pub fn snapshot_request(name: &str, source_disk: &str) -> SnapshotRequest {
    SnapshotRequest {
        name: name.to_string(),
        source_disk: source_disk.to_string(),
    }
}

/// Image built from a snapshot in the same project, stored in `storage_location`
/// (a multi-region such as `us`, or a region).
pub fn image_request(name: &str, snapshot: &str, storage_location: &str) -> ImageRequest {
    ImageRequest {
        name: name.to_string(),
        source_snapshot: format!("global/snapshots/{}", snapshot),
        storage_locations: vec![storage_location.to_string()],
    }
}

/// Policy granting the destination project's service agent use of an image.
pub fn image_share_request(destination_project_number: &str) -> SetPolicyRequest {
    SetPolicyRequest {
        policy: Policy {
            bindings: vec![Binding {
                role: IMAGE_USER_ROLE.to_string(),
                members: vec![service_agent_member(destination_project_number)],
            }],
            etag: None,
        },
    }
}

/// Creates the `InstanceRequest` for a migrated VM.
///
/// The boot disk is initialized from `boot_image` (a full image path, typically
/// in the source project) and deleted with the instance. The single network
/// interface attaches to `network`/`subnet` in `project_id`, the subnet being
/// looked up in the zone's region.
///
/// # Arguments
/// * `name` - The name for the new instance.
/// * `project_id` - The project the instance is created in.
/// * `zone` - The zone for the instance (e.g., "us-central1-a").
/// * `machine_type` - The machine type (e.g., "e2-medium").
/// * `boot_image` - Full path of the boot image.
/// * `network` - Network name in `project_id`.
/// * `subnet` - Subnetwork name in the zone's region.
pub fn migrated_instance_request(
    name: &str,
    project_id: &str,
    zone: &str,
    machine_type: &str,
    boot_image: &str,
    network: &str,
    subnet: &str,
) -> InstanceRequest {
    InstanceRequest {
        name: name.to_string(),
        machine_type: format!("zones/{}/machineTypes/{}", zone, machine_type),
        disks: vec![NewDisk {
            boot: true,
            auto_delete: true,
            initialize_params: InitializeParams {
                source_image: boot_image.to_string(),
            },
        }],
        network_interfaces: vec![NetworkInterface {
            network: format!("projects/{}/global/networks/{}", project_id, network),
            subnetwork: format!(
                "projects/{}/regions/{}/subnetworks/{}",
                project_id,
                region_of(zone),
                subnet
            ),
        }],
    }
}

pub fn data_disk_request(name: &str, source_image: &str) -> DiskRequest {
    DiskRequest {
        name: name.to_string(),
        source_image: source_image.to_string(),
    }
}

pub fn attach_disk_request(project_id: &str, zone: &str, disk: &str) -> AttachDiskRequest {
    AttachDiskRequest {
        source: disk_path(project_id, zone, disk),
    }
}
