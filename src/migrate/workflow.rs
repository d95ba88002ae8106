use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::gcp::gce::defaults::*;
use crate::gcp::gce::{Compute, Instance, Operation};
use crate::last_segment;
use crate::migrate::naming::{MigrationId, data_disk_name};
use crate::migrate::{
    CreatedResource, DiskDescriptor, DiskRole, ImageRecord, MigrationFailure, MigrationReport,
    MigrationRequest, RateLimiter, Step, wait_for_operation,
};

/// Runs migrations against a control plane with one fixed configuration.
pub struct Migrator<'a, C> {
    pub(crate) compute: &'a C,
    pub(crate) config: &'a MigrationConfig,
    limiter: RateLimiter,
    pub(crate) cancel: Arc<AtomicBool>,
    clock: fn() -> DateTime<Utc>,
}

/// What a run has done so far.
#[derive(Debug, Default)]
struct Progress {
    current: Option<Step>,
    completed: Vec<Step>,
    created: Vec<CreatedResource>,
}

impl Progress {
    fn begin(&mut self, step: Step) {
        tracing::info!("--- {} ---", step);
        self.current = Some(step);
    }

    fn done(&mut self) {
        if let Some(step) = self.current.take() {
            self.completed.push(step);
        }
    }
}

impl<'a, C: Compute> Migrator<'a, C> {
    pub fn new(compute: &'a C, config: &'a MigrationConfig) -> Self {
        Migrator {
            compute,
            config,
            limiter: RateLimiter::new(config.rate_limit),
            cancel: Arc::new(AtomicBool::new(false)),
            clock: Utc::now,
        }
    }

    /// Raising `cancel` aborts the current operation wait and skips the rest of a batch.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Migrates one VM. Any error aborts the migration; nothing is cleaned up.
    pub async fn migrate_vm(
        &mut self,
        request: &MigrationRequest,
    ) -> std::result::Result<MigrationReport, MigrationFailure> {
        let id = MigrationId::new(
            &request.source_project,
            &request.source_zone,
            &request.source_instance,
            (self.clock)(),
        );
        tracing::info!(
            "Starting migration for VM '{}' with Migration ID: {}",
            request.source_instance,
            id
        );

        let mut progress = Progress::default();
        match self.run(request, &id, &mut progress).await {
            Ok(report) => {
                tracing::info!(
                    "Migration for VM '{}' completed successfully!",
                    request.source_instance
                );
                Ok(report)
            }
            Err(error) => {
                let failure = MigrationFailure {
                    request: request.clone(),
                    id,
                    step: progress.current.take(),
                    error,
                    completed: progress.completed,
                    created: progress.created,
                };
                tracing::error!("{}", failure);
                Err(failure)
            }
        }
    }

    async fn run(
        &mut self,
        request: &MigrationRequest,
        id: &MigrationId,
        progress: &mut Progress,
    ) -> Result<MigrationReport> {
        let compute = self.compute;
        let src = request.source_project.as_str();
        let zone = request.source_zone.as_str();
        let vm = request.source_instance.as_str();

        // Step 1: Stop the source VM so its disks are consistent.
        self.execute(
            progress,
            Step::StopSource {
                instance: vm.to_string(),
            },
            None,
            src,
            || compute.stop_instance(src, zone, vm),
        )
        .await?;

        // Step 2: Identify disks.
        progress.begin(Step::Inspect {
            instance: vm.to_string(),
        });
        let instance = self
            .limiter
            .submit("get instance", &self.cancel, || compute.get_instance(src, zone, vm))
            .await?;
        let disks = describe_disks(&instance);
        let machine_type = match &request.machine_type {
            Some(machine_type) => machine_type.clone(),
            None => last_segment(&instance.machine_type).to_string(),
        };
        tracing::info!("Found {} disk(s) to process.", disks.len());
        progress.done();

        // Step 3: Snapshot, image and share every disk.
        let share = image_share_request(&self.config.destination_project_number);
        let mut images = Vec::with_capacity(disks.len());
        for disk in &disks {
            let disk_name = disk.name();
            tracing::info!("Processing {} disk: '{}'", disk.role(), disk_name);

            let snapshot = id.snapshot_name(disk_name);
            let body = snapshot_request(&snapshot, &disk.source);
            self.execute(
                progress,
                Step::Snapshot {
                    disk: disk_name.to_string(),
                    snapshot: snapshot.clone(),
                },
                Some(CreatedResource::Snapshot {
                    project: src.to_string(),
                    name: snapshot.clone(),
                }),
                src,
                || compute.insert_snapshot(src, &body),
            )
            .await?;

            let image = id.image_name(disk_name);
            let body = image_request(&image, &snapshot, &self.config.image_location);
            self.execute(
                progress,
                Step::Image {
                    snapshot: snapshot.clone(),
                    image: image.clone(),
                },
                Some(CreatedResource::Image {
                    project: src.to_string(),
                    name: image.clone(),
                }),
                src,
                || compute.insert_image(src, &body),
            )
            .await?;
            images.push(ImageRecord {
                name: image.clone(),
                role: disk.role(),
                source_disk: disk_name.to_string(),
            });

            progress.begin(Step::ShareImage {
                image: image.clone(),
            });
            self.limiter
                .submit("share image", &self.cancel, || {
                    compute.set_image_iam_policy(src, &image, &share)
                })
                .await?;
            tracing::info!(
                "Image '{}' shared with project '{}'.",
                image,
                request.destination_project
            );
            progress.done();

            self.limiter.wait(&self.cancel).await?;
        }

        // Step 4: Exactly one boot image, or no VM.
        progress.begin(Step::SelectBootImage);
        let (boot, data) = select_boot_image(vm, &images)?;
        progress.done();

        // Step 5: Create the new VM in the destination project.
        let dst = request.destination_project.as_str();
        let dst_zone = request.destination_zone.as_str();
        let target = request.target_instance.as_str();
        let body = migrated_instance_request(
            target,
            dst,
            dst_zone,
            &machine_type,
            &image_path(src, &boot.name),
            &request.network,
            &request.subnet,
        );
        self.execute(
            progress,
            Step::CreateInstance {
                instance: target.to_string(),
            },
            Some(CreatedResource::Instance {
                project: dst.to_string(),
                zone: dst_zone.to_string(),
                name: target.to_string(),
            }),
            dst,
            || compute.insert_instance(dst, dst_zone, &body),
        )
        .await?;
        tracing::info!("VM '{}' created with boot disk.", target);

        // Step 6: Recreate and attach data disks, keeping source order.
        let mut data_disks = Vec::with_capacity(data.len());
        for (i, image) in data.iter().enumerate() {
            let disk = data_disk_name(target, i);
            let body = data_disk_request(&disk, &image_path(src, &image.name));
            self.execute(
                progress,
                Step::CreateDisk { disk: disk.clone() },
                Some(CreatedResource::Disk {
                    project: dst.to_string(),
                    zone: dst_zone.to_string(),
                    name: disk.clone(),
                }),
                dst,
                || compute.insert_disk(dst, dst_zone, &body),
            )
            .await?;

            let attach = attach_disk_request(dst, dst_zone, &disk);
            self.execute(
                progress,
                Step::AttachDisk {
                    disk: disk.clone(),
                    instance: target.to_string(),
                },
                None,
                dst,
                || compute.attach_disk(dst, dst_zone, target, &attach),
            )
            .await?;
            tracing::info!("Data disk '{}' attached.", disk);
            data_disks.push(disk);
        }

        Ok(MigrationReport {
            request: request.clone(),
            id: id.clone(),
            machine_type,
            images,
            data_disks,
            created: progress.created.clone(),
        })
    }

    /// Submits one mutating call through the limiter and waits for its operation.
    async fn execute<F, Fut>(
        &mut self,
        progress: &mut Progress,
        step: Step,
        creates: Option<CreatedResource>,
        project: &str,
        call: F,
    ) -> Result<Operation>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Operation>>,
    {
        let what = step.to_string();
        progress.begin(step);
        let operation = self.limiter.submit(&what, &self.cancel, call).await?;
        if let Some(resource) = creates {
            progress.created.push(resource);
        }
        let done = wait_for_operation(
            self.compute,
            project,
            &operation,
            &self.config.wait,
            &self.cancel,
        )
        .await?;
        progress.done();
        Ok(done)
    }
}

/// Disks of `instance` that can be snapshotted, in attachment order.
fn describe_disks(instance: &Instance) -> Vec<DiskDescriptor> {
    instance
        .disks
        .iter()
        .filter_map(|disk| match &disk.source {
            Some(source) => Some(DiskDescriptor {
                source: source.clone(),
                boot: disk.boot,
            }),
            None => {
                tracing::warn!(
                    "Skipping disk {} of '{}': it has no persistent source",
                    disk.device_name.as_deref().unwrap_or("<unnamed>"),
                    instance.name
                );
                None
            }
        })
        .collect()
}

/// Splits `images` into the single boot image and the data images, in order.
fn select_boot_image<'i>(
    instance: &str,
    images: &'i [ImageRecord],
) -> Result<(&'i ImageRecord, Vec<&'i ImageRecord>)> {
    let (boot, data): (Vec<&ImageRecord>, Vec<&ImageRecord>) =
        images.iter().partition(|image| image.role == DiskRole::Boot);
    match boot.as_slice() {
        [boot] => Ok((*boot, data)),
        [] => Err(Error::BootImageMissing(instance.to_string())),
        _ => Err(Error::MultipleBootImages {
            instance: instance.to_string(),
            count: boot.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::gce::fake::{Call, FakeCompute, instance};
    use crate::migrate::{RateLimitPolicy, WaitPolicy};
    use chrono::TimeZone;
    use std::time::Duration;

    const SRC: &str = "ce-ai-chatbot";
    const DST: &str = "ce-testing-465204";

    fn config() -> MigrationConfig {
        let mut c = MigrationConfig::new(
            SRC,
            DST,
            "526827734705",
            "us-central1-a",
            "new-base-network",
            "new-first-subnet",
        );
        c.wait = WaitPolicy {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(5),
        };
        c.rate_limit = RateLimitPolicy {
            floor: Duration::ZERO,
            ceiling: Duration::ZERO,
            max_retries: 2,
        };
        c
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn request(c: &MigrationConfig) -> MigrationRequest {
        c.request("us-central1-c", "my-base-vm", "migrated-vm", Some("e2-medium"))
    }

    fn fake(disks: &[(&str, bool)]) -> FakeCompute {
        FakeCompute::new()
            .polls_before_done(1)
            .with_instance(instance(SRC, "us-central1-c", "my-base-vm", "n2-standard-4", disks))
    }

    #[tokio::test]
    async fn boot_and_data_disks_become_images() {
        let c = config();
        let fake = fake(&[("disk-a", true), ("disk-b", false)]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let report = migrator.migrate_vm(&request(&c)).await.unwrap();

        let id = report.id.as_str();
        assert!(id.starts_with("20250701-120000-"));
        assert_eq!(
            report.images,
            vec![
                ImageRecord {
                    name: format!("disk-a-image-{}", id),
                    role: DiskRole::Boot,
                    source_disk: "disk-a".to_string(),
                },
                ImageRecord {
                    name: format!("disk-b-image-{}", id),
                    role: DiskRole::Data,
                    source_disk: "disk-b".to_string(),
                },
            ]
        );

        let created: Vec<Call> = fake
            .requests()
            .into_iter()
            .filter(|c| matches!(c, Call::InsertInstance { .. }))
            .collect();
        assert_eq!(created.len(), 1);
        let Call::InsertInstance {
            project,
            zone,
            request,
        } = &created[0]
        else {
            unreachable!()
        };
        assert_eq!(project, DST);
        assert_eq!(zone, "us-central1-a");
        assert_eq!(request.disks.len(), 1);
        assert_eq!(
            request.disks[0].initialize_params.source_image,
            format!("projects/{}/global/images/disk-a-image-{}", SRC, id)
        );
        assert_eq!(request.machine_type, "zones/us-central1-a/machineTypes/e2-medium");
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let c = config();
        let fake = fake(&[("disk-a", true), ("disk-b", false)]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let report = migrator.migrate_vm(&request(&c)).await.unwrap();
        let id = report.id.as_str();

        let kinds: Vec<String> = fake
            .requests()
            .iter()
            .map(|call| match call {
                Call::StopInstance { instance, .. } => format!("stop {}", instance),
                Call::GetInstance { instance, .. } => format!("get {}", instance),
                Call::InsertSnapshot { request, .. } => format!("snapshot {}", request.name),
                Call::InsertImage { request, .. } => format!("image {}", request.name),
                Call::SetImageIamPolicy { image, .. } => format!("share {}", image),
                Call::InsertInstance { request, .. } => format!("vm {}", request.name),
                Call::InsertDisk { request, .. } => format!("disk {}", request.name),
                Call::AttachDisk { source, .. } => format!("attach {}", source),
                other => format!("{:?}", other),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "stop my-base-vm".to_string(),
                "get my-base-vm".to_string(),
                format!("snapshot disk-a-snapshot-{}", id),
                format!("image disk-a-image-{}", id),
                format!("share disk-a-image-{}", id),
                format!("snapshot disk-b-snapshot-{}", id),
                format!("image disk-b-image-{}", id),
                format!("share disk-b-image-{}", id),
                "vm migrated-vm".to_string(),
                "disk migrated-vm-data-disk-0".to_string(),
                format!(
                    "attach projects/{}/zones/us-central1-a/disks/migrated-vm-data-disk-0",
                    DST
                ),
            ]
        );
    }

    #[tokio::test]
    async fn image_is_built_from_snapshot_and_shared() {
        let c = config();
        let fake = fake(&[("disk-a", true)]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let report = migrator.migrate_vm(&request(&c)).await.unwrap();
        let id = report.id.as_str();

        let requests = fake.requests();
        let snapshot = requests
            .iter()
            .find_map(|c| match c {
                Call::InsertSnapshot { project, request } => Some((project, request)),
                _ => None,
            })
            .unwrap();
        assert_eq!(snapshot.0, SRC);
        assert_eq!(
            snapshot.1.source_disk,
            format!(
                "https://www.googleapis.com/compute/v1/projects/{}/zones/us-central1-c/disks/disk-a",
                SRC
            )
        );
        let image = requests
            .iter()
            .find_map(|c| match c {
                Call::InsertImage { request, .. } => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            image.source_snapshot,
            format!("global/snapshots/disk-a-snapshot-{}", id)
        );
        assert_eq!(image.storage_locations, vec!["us".to_string()]);
        let share = requests
            .iter()
            .find_map(|c| match c {
                Call::SetImageIamPolicy { request, .. } => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            share.policy.bindings[0].members,
            vec!["serviceAccount:service-526827734705@compute-system.iam.gserviceaccount.com"]
        );
        assert!(report.data_disks.is_empty());
    }

    #[tokio::test]
    async fn data_disks_are_named_by_position() {
        let c = config();
        let fake = fake(&[
            ("logs", false),
            ("root", true),
            ("db", false),
            ("cache", false),
        ]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let report = migrator.migrate_vm(&request(&c)).await.unwrap();
        let id = report.id.as_str();

        assert_eq!(
            report.data_disks,
            vec![
                "migrated-vm-data-disk-0",
                "migrated-vm-data-disk-1",
                "migrated-vm-data-disk-2"
            ]
        );
        let disks: Vec<(String, String)> = fake
            .requests()
            .into_iter()
            .filter_map(|c| match c {
                Call::InsertDisk { request, .. } => Some((request.name, request.source_image)),
                _ => None,
            })
            .collect();
        let expected: Vec<(String, String)> = ["logs", "db", "cache"]
            .iter()
            .enumerate()
            .map(|(i, src_disk)| {
                (
                    format!("migrated-vm-data-disk-{}", i),
                    format!("projects/{}/global/images/{}-image-{}", SRC, src_disk, id),
                )
            })
            .collect();
        assert_eq!(disks, expected);
    }

    #[tokio::test]
    async fn missing_boot_disk_aborts_before_vm_creation() {
        let c = config();
        let fake = fake(&[("disk-b", false)]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let failure = migrator.migrate_vm(&request(&c)).await.unwrap_err();

        assert!(matches!(failure.error, Error::BootImageMissing(ref vm) if vm == "my-base-vm"));
        assert_eq!(failure.step, Some(Step::SelectBootImage));
        assert!(
            !fake
                .requests()
                .iter()
                .any(|c| matches!(c, Call::InsertInstance { .. } | Call::InsertDisk { .. }))
        );
        // The data disk's snapshot and image are left behind and reported.
        assert_eq!(failure.created.len(), 2);
    }

    #[test]
    fn two_boot_images_are_rejected() {
        let images = vec![
            ImageRecord {
                name: "a".to_string(),
                role: DiskRole::Boot,
                source_disk: "a".to_string(),
            },
            ImageRecord {
                name: "b".to_string(),
                role: DiskRole::Boot,
                source_disk: "b".to_string(),
            },
        ];
        let err = select_boot_image("vm", &images).unwrap_err();
        assert!(matches!(err, Error::MultipleBootImages { count: 2, .. }));
    }

    #[tokio::test]
    async fn machine_type_is_copied_when_unset() {
        let c = config();
        let fake = fake(&[("disk-a", true)]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let req = c.request("us-central1-c", "my-base-vm", "migrated-vm", None);
        let report = migrator.migrate_vm(&req).await.unwrap();
        assert_eq!(report.machine_type, "n2-standard-4");
    }

    #[tokio::test]
    async fn stop_failure_aborts_everything() {
        let c = config();
        let fake = fake(&[("disk-a", true)])
            .fail_operation(|c| matches!(c, Call::StopInstance { .. }), "RESOURCE_NOT_READY");
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let failure = migrator.migrate_vm(&request(&c)).await.unwrap_err();

        assert!(matches!(failure.error, Error::OperationFailed { .. }));
        assert!(matches!(failure.step, Some(Step::StopSource { .. })));
        assert!(failure.completed.is_empty());
        assert!(failure.created.is_empty());
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test]
    async fn failure_reports_progress_for_cleanup() {
        let c = config();
        let fake = fake(&[("disk-a", true), ("disk-b", false)])
            .fail_operation(|c| matches!(c, Call::InsertDisk { .. }), "QUOTA_EXCEEDED");
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let failure = migrator.migrate_vm(&request(&c)).await.unwrap_err();

        assert_eq!(
            failure.step,
            Some(Step::CreateDisk {
                disk: "migrated-vm-data-disk-0".to_string()
            })
        );
        let created: Vec<String> = failure.created.iter().map(|r| r.to_string()).collect();
        let id = failure.id.as_str();
        assert_eq!(
            created,
            vec![
                format!("projects/{}/global/snapshots/disk-a-snapshot-{}", SRC, id),
                format!("projects/{}/global/images/disk-a-image-{}", SRC, id),
                format!("projects/{}/global/snapshots/disk-b-snapshot-{}", SRC, id),
                format!("projects/{}/global/images/disk-b-image-{}", SRC, id),
                format!("projects/{}/zones/us-central1-a/instances/migrated-vm", DST),
                format!("projects/{}/zones/us-central1-a/disks/migrated-vm-data-disk-0", DST),
            ]
        );
        assert!(failure.completed.contains(&Step::SelectBootImage));
        assert!(
            failure
                .to_string()
                .starts_with("migration of VM 'my-base-vm' failed at step 'create data disk")
        );
    }

    #[tokio::test]
    async fn throttled_submissions_are_retried() {
        let c = config();
        let fake = fake(&[("disk-a", true)]).fail_submit_times(
            |c| matches!(c, Call::InsertImage { .. }),
            429,
            "rateLimitExceeded",
            2,
        );
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        migrator.migrate_vm(&request(&c)).await.unwrap();
        let attempts = fake
            .requests()
            .iter()
            .filter(|c| matches!(c, Call::InsertImage { .. }))
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn pauses_once_after_each_disk() {
        let mut c = config();
        c.rate_limit = RateLimitPolicy {
            floor: Duration::from_millis(40),
            ceiling: Duration::from_millis(40),
            max_retries: 0,
        };
        let fake = fake(&[("disk-a", true), ("disk-b", false), ("disk-c", false)]);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let started = std::time::Instant::now();
        migrator.migrate_vm(&request(&c)).await.unwrap();
        assert!(
            started.elapsed() >= Duration::from_millis(120),
            "{:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn cancel_during_disk_pause_stops_the_run() {
        let mut c = config();
        c.rate_limit = RateLimitPolicy {
            floor: Duration::from_secs(300),
            ceiling: Duration::from_secs(300),
            max_retries: 0,
        };
        let fake = fake(&[("disk-a", true)]);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut migrator = Migrator::new(&fake, &c)
            .with_clock(fixed_clock)
            .with_cancel(cancel.clone());
        let raise = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        let started = std::time::Instant::now();
        let failure = migrator.migrate_vm(&request(&c)).await.unwrap_err();
        raise.await.unwrap();
        assert!(matches!(failure.error, Error::Cancelled));
        assert!(failure.completed.contains(&Step::ShareImage {
            image: format!("disk-a-image-{}", failure.id),
        }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(
            !fake
                .requests()
                .iter()
                .any(|c| matches!(c, Call::InsertInstance { .. }))
        );
    }

    #[tokio::test]
    async fn scratch_disks_are_skipped() {
        let c = config();
        let mut vm = instance(SRC, "us-central1-c", "my-base-vm", "e2-medium", &[("root", true)]);
        vm.disks.push(crate::gcp::gce::AttachedDisk {
            source: None,
            boot: false,
            device_name: Some("local-ssd-0".to_string()),
            index: Some(1),
        });
        let fake = FakeCompute::new().with_instance(vm);
        let mut migrator = Migrator::new(&fake, &c).with_clock(fixed_clock);
        let report = migrator.migrate_vm(&request(&c)).await.unwrap();
        assert_eq!(report.images.len(), 1);
        assert!(report.data_disks.is_empty());
    }
}
