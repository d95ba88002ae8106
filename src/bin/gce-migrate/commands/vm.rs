use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use gce_migrate::config::MigrationConfig;
use gce_migrate::gcp::gce::GceClient;
use gce_migrate::migrate::{MigrationRequest, Migrator};

use crate::common::{print_leftovers, print_table};

pub async fn run(
    compute: &GceClient,
    config: &MigrationConfig,
    request: &MigrationRequest,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mut migrator = Migrator::new(compute, config).with_cancel(cancel);
    match migrator.migrate_vm(request).await {
        Ok(report) => {
            println!(
                "VM '{}' migrated to '{}' in project '{}' (migration id {}).",
                request.source_instance,
                request.target_instance,
                request.destination_project,
                report.id
            );
            let rows: Vec<[String; 3]> = report
                .images
                .iter()
                .map(|image| {
                    [
                        image.source_disk.clone(),
                        image.role.to_string(),
                        image.name.clone(),
                    ]
                })
                .collect();
            print_table(&["DISK", "ROLE", "IMAGE"], &rows);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure);
            print_leftovers(&failure);
            Err(failure.into())
        }
    }
}
