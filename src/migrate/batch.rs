//! Label-driven discovery and the batch loop.

use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::gcp::gce::Compute;
use crate::last_segment;
use crate::migrate::{MigrationFailure, MigrationReport, MigrationRequest, Migrator};

#[derive(Debug)]
pub enum Outcome {
    Migrated(MigrationReport),
    Failed(MigrationFailure),
    /// Not started because the run was cancelled.
    Skipped,
}

#[derive(Debug)]
pub struct BatchEntry {
    pub request: MigrationRequest,
    pub outcome: Outcome,
}

/// Per-VM outcomes of a batch, in discovery order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn migrated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Migrated(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| f(&e.outcome)).count()
    }
}

impl<C: Compute> Migrator<'_, C> {
    /// Lists the source project's VMs matching the label filter, across all zones.
    pub async fn discover(&mut self) -> Result<Vec<MigrationRequest>> {
        let project = self.config.source_project.as_str();
        let filter = self.config.label_filter.as_str();
        tracing::info!(
            "Discovering VMs with filter '{}' in project '{}'...",
            filter,
            project
        );

        let mut requests = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .compute
                .list_instances_page(project, filter, page_token.as_deref())
                .await?;
            for (scope, list) in page.items {
                for instance in list.instances {
                    tracing::debug!("Found '{}' in {}", instance.name, scope);
                    let target = self.config.target_name(&instance.name);
                    requests.push(self.config.request(
                        last_segment(&instance.zone),
                        &instance.name,
                        &target,
                        Some(last_segment(&instance.machine_type)),
                    ));
                }
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::info!("Found {} VM(s) to migrate.", requests.len());
        Ok(requests)
    }

    /// Migrates each request in turn. A failed VM is recorded and the loop moves on.
    pub async fn migrate_all(&mut self, requests: Vec<MigrationRequest>) -> BatchReport {
        let mut report = BatchReport::default();
        for request in requests {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("Cancelled; skipping VM '{}'", request.source_instance);
                report.entries.push(BatchEntry {
                    request,
                    outcome: Outcome::Skipped,
                });
                continue;
            }
            let outcome = match self.migrate_vm(&request).await {
                Ok(migrated) => Outcome::Migrated(migrated),
                Err(failure) => {
                    tracing::error!(
                        "Failed to migrate VM '{}': {}",
                        request.source_instance,
                        failure.error
                    );
                    Outcome::Failed(failure)
                }
            };
            report.entries.push(BatchEntry { request, outcome });
        }
        tracing::info!(
            "Batch finished: {} migrated, {} failed, {} skipped.",
            report.migrated(),
            report.failed(),
            report.skipped()
        );
        report
    }

    /// Discovers and migrates every matching VM.
    pub async fn migrate_labeled(&mut self) -> Result<BatchReport> {
        let requests = self.discover().await?;
        Ok(self.migrate_all(requests).await)
    }
}
