//! # Google Compute Engine (GCE) Data Types
//!
//! This module defines the Rust structs that model the JSON objects exchanged
//! with the Compute Engine v1 API during a migration: operations, instances,
//! and the request bodies for snapshots, images, disks and instances.
//!
//! Only the fields the migration reads or writes are modelled; everything else
//! in a response is ignored on deserialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::last_segment;

/// Status value of an operation that has reached its terminal state.
pub const STATUS_DONE: &str = "DONE";

/// An asynchronous operation returned by every mutating Compute Engine call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    /// URL of the zone for zonal operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// URL of the region for regional operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// `PENDING`, `RUNNING` or `DONE`.
    #[serde(default)]
    pub status: String,
    /// Present only when the operation finished unsuccessfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }

    /// Where this operation lives, and therefore which endpoint reports on it.
    pub fn scope(&self) -> OperationScope {
        if let Some(zone) = &self.zone {
            OperationScope::Zonal(last_segment(zone).to_string())
        } else if let Some(region) = &self.region {
            OperationScope::Regional(last_segment(region).to_string())
        } else {
            OperationScope::Global
        }
    }
}

/// The endpoint class an operation must be polled through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationScope {
    Zonal(String),
    Regional(String),
    Global,
}

impl fmt::Display for OperationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationScope::Zonal(zone) => write!(f, "zone {}", zone),
            OperationScope::Regional(region) => write!(f, "region {}", region),
            OperationScope::Global => f.write_str("global"),
        }
    }
}

/// Error payload attached to a finished operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationErrorItem {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("unspecified error");
        }
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.code, e.message)?;
        }
        Ok(())
    }
}

/// An instance as returned by `instances.get` and `instances.aggregatedList`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    /// URL of the instance's zone.
    #[serde(default)]
    pub zone: String,
    /// URL of the instance's machine type.
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub disks: Vec<AttachedDisk>,
}

/// A disk attached to an existing instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    /// URL of the persistent disk. Absent for local scratch disks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub boot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Response of `instances.aggregatedList`, one page.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceAggregatedList {
    /// Keyed by scope, e.g. `zones/us-central1-a`.
    #[serde(default)]
    pub items: BTreeMap<String, InstancesScopedList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InstancesScopedList {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

/// Request body for `snapshots.insert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    pub name: String,
    pub source_disk: String,
}

/// Request body for `images.insert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub name: String,
    pub source_snapshot: String,
    pub storage_locations: Vec<String>,
}

/// Request body for `images.setIamPolicy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPolicyRequest {
    pub policy: Policy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    pub members: Vec<String>,
}

/// Request body for `disks.insert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskRequest {
    pub name: String,
    pub source_image: String,
}

/// Request body for `instances.attachDisk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachDiskRequest {
    pub source: String,
}

/// Request body for `instances.insert` when recreating a migrated VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    pub name: String,
    /// Partial URL, e.g. `zones/us-central1-a/machineTypes/e2-medium`.
    pub machine_type: String,
    pub disks: Vec<NewDisk>,
    pub network_interfaces: Vec<NetworkInterface>,
}

/// A disk created together with the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDisk {
    pub boot: bool,
    pub auto_delete: bool,
    pub initialize_params: InitializeParams,
}

/// Parameters for initializing a disk from a source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub source_image: String,
}

/// A network interface for the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub network: String,
    pub subnetwork: String,
}
