//! # VM Migration
//!
//! Moves Compute Engine instances from one project to another by way of disk
//! snapshots and shared images:
//!
//! 1. stop the source VM,
//! 2. snapshot each disk and turn the snapshot into an image,
//! 3. share each image with the destination project's service agent,
//! 4. recreate the VM in the destination project from the boot image and
//!    attach new disks created from the data images.
//!
//! Nothing is rolled back on failure. A [`MigrationFailure`] lists the steps
//! that completed and every resource created so far, for manual cleanup.
//!
//! ## Submodules
//! - `workflow`: the single-VM migration ([`Migrator::migrate_vm`]).
//! - `batch`: label-based discovery and the fault-tolerant batch loop.
//! - `waiter`: polling operations to completion.
//! - `limiter`: adaptive pacing of API submissions.
//! - `naming`: migration ids and derived resource names.

pub mod batch;
pub mod limiter;
pub mod naming;
pub mod waiter;
pub mod workflow;

use std::fmt;

use crate::error::Error;
use crate::last_segment;

pub use batch::{BatchEntry, BatchReport, Outcome};
pub use limiter::{RateLimitPolicy, RateLimiter};
pub use naming::MigrationId;
pub use waiter::{WaitPolicy, wait_for_operation};
pub use workflow::Migrator;

/// Everything needed to migrate one VM. Immutable for the duration of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub source_project: String,
    pub source_zone: String,
    pub source_instance: String,
    pub destination_project: String,
    pub destination_zone: String,
    /// Machine type of the new VM. Copied from the source VM when unset.
    pub machine_type: Option<String>,
    pub target_instance: String,
    pub network: String,
    pub subnet: String,
}

/// A source disk as seen when the VM was inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    /// Full URL of the persistent disk.
    pub source: String,
    pub boot: bool,
}

impl DiskDescriptor {
    pub fn name(&self) -> &str {
        last_segment(&self.source)
    }

    pub fn role(&self) -> DiskRole {
        if self.boot {
            DiskRole::Boot
        } else {
            DiskRole::Data
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskRole {
    Boot,
    Data,
}

impl fmt::Display for DiskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskRole::Boot => f.write_str("boot"),
            DiskRole::Data => f.write_str("data"),
        }
    }
}

/// An image produced from one source disk during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub name: String,
    pub role: DiskRole,
    pub source_disk: String,
}

/// One step of the per-VM workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    StopSource { instance: String },
    Inspect { instance: String },
    Snapshot { disk: String, snapshot: String },
    Image { snapshot: String, image: String },
    ShareImage { image: String },
    SelectBootImage,
    CreateInstance { instance: String },
    CreateDisk { disk: String },
    AttachDisk { disk: String, instance: String },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::StopSource { instance } => write!(f, "stop VM '{}'", instance),
            Step::Inspect { instance } => write!(f, "identify disks of '{}'", instance),
            Step::Snapshot { disk, snapshot } => {
                write!(f, "snapshot disk '{}' as '{}'", disk, snapshot)
            }
            Step::Image { snapshot, image } => {
                write!(f, "create image '{}' from snapshot '{}'", image, snapshot)
            }
            Step::ShareImage { image } => write!(f, "share image '{}'", image),
            Step::SelectBootImage => f.write_str("select boot image"),
            Step::CreateInstance { instance } => write!(f, "create VM '{}'", instance),
            Step::CreateDisk { disk } => write!(f, "create data disk '{}'", disk),
            Step::AttachDisk { disk, instance } => {
                write!(f, "attach disk '{}' to '{}'", disk, instance)
            }
        }
    }
}

/// A cloud resource a run created (or asked the control plane to create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedResource {
    Snapshot { project: String, name: String },
    Image { project: String, name: String },
    Instance { project: String, zone: String, name: String },
    Disk { project: String, zone: String, name: String },
}

impl fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatedResource::Snapshot { project, name } => {
                write!(f, "projects/{}/global/snapshots/{}", project, name)
            }
            CreatedResource::Image { project, name } => {
                write!(f, "projects/{}/global/images/{}", project, name)
            }
            CreatedResource::Instance {
                project,
                zone,
                name,
            } => write!(f, "projects/{}/zones/{}/instances/{}", project, zone, name),
            CreatedResource::Disk {
                project,
                zone,
                name,
            } => write!(f, "projects/{}/zones/{}/disks/{}", project, zone, name),
        }
    }
}

/// Result of a successful single-VM migration.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub request: MigrationRequest,
    pub id: MigrationId,
    pub machine_type: String,
    pub images: Vec<ImageRecord>,
    /// Names of the data disks attached to the new VM, in source order.
    pub data_disks: Vec<String>,
    pub created: Vec<CreatedResource>,
}

/// A migration that stopped part way. Resources in `created` are left in place.
#[derive(Debug)]
pub struct MigrationFailure {
    pub request: MigrationRequest,
    pub id: MigrationId,
    /// The step that was running when the error occurred.
    pub step: Option<Step>,
    pub error: Error,
    pub completed: Vec<Step>,
    pub created: Vec<CreatedResource>,
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "migration of VM '{}' failed", self.request.source_instance)?;
        if let Some(step) = &self.step {
            write!(f, " at step '{}'", step)?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for MigrationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
