use anyhow::{Context, Result};
use gce_migrate::config::MigrationConfig;
use gce_migrate::gcp::gce::GceClient;
use gce_migrate::migrate::Migrator;

use crate::common::print_requests;

pub async fn run(compute: &GceClient, config: &MigrationConfig) -> Result<()> {
    let mut migrator = Migrator::new(compute, config);
    let requests = migrator
        .discover()
        .await
        .context("Failed to list instances")?;
    if requests.is_empty() {
        println!("No VMs match '{}'.", config.label_filter);
        return Ok(());
    }
    print_requests(&requests);
    Ok(())
}
