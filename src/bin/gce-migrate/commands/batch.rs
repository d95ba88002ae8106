use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use gce_migrate::config::MigrationConfig;
use gce_migrate::gcp::gce::GceClient;
use gce_migrate::migrate::Migrator;

use crate::common::print_report;

pub async fn run(
    compute: &GceClient,
    config: &MigrationConfig,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mut migrator = Migrator::new(compute, config).with_cancel(cancel);
    let report = migrator
        .migrate_labeled()
        .await
        .context("Failed to discover VMs")?;
    if report.entries.is_empty() {
        println!("No VMs match '{}'.", config.label_filter);
        return Ok(());
    }
    print_report(&report);
    println!(
        "{} migrated, {} failed, {} skipped.",
        report.migrated(),
        report.failed(),
        report.skipped()
    );
    Ok(())
}
