//! Waiting for Compute Engine operations to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gcp::gce::{Compute, Operation, OperationScope};

/// How often to poll an operation and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Polls `operation` in `project` until it is `DONE`.
///
/// The endpoint follows the handle's scope: zonal when it carries a zone,
/// regional when it carries a region, global otherwise. Returns the final
/// operation resource, or:
/// - `OperationFailed` if the finished operation carries an error payload,
/// - `OperationTimedOut` once `policy.timeout` has elapsed,
/// - `Cancelled` as soon as `cancel` is raised.
pub async fn wait_for_operation<C: Compute>(
    compute: &C,
    project: &str,
    operation: &Operation,
    policy: &WaitPolicy,
    cancel: &AtomicBool,
) -> Result<Operation> {
    tracing::debug!("Waiting for operation '{}'...", operation.name);
    let scope = operation.scope();
    let poll = async {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
            let current = match &scope {
                OperationScope::Zonal(zone) => {
                    compute
                        .get_zone_operation(project, zone, &operation.name)
                        .await?
                }
                OperationScope::Regional(region) => {
                    compute
                        .get_region_operation(project, region, &operation.name)
                        .await?
                }
                OperationScope::Global => {
                    compute
                        .get_global_operation(project, &operation.name)
                        .await?
                }
            };
            if current.is_done() {
                return match current.error {
                    Some(error) => {
                        tracing::error!("Operation '{}' failed: {}", current.name, error);
                        Err(Error::OperationFailed {
                            name: current.name,
                            error,
                        })
                    }
                    None => {
                        tracing::debug!("Operation '{}' finished.", current.name);
                        Ok(current)
                    }
                };
            }
            tokio::time::sleep(policy.interval).await;
        }
    };

    match tokio::time::timeout(policy.timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(Error::OperationTimedOut {
            name: operation.name.clone(),
            timeout: policy.timeout,
        }),
    }
}
