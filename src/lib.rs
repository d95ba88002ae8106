// # gce-migrate: Moving Compute Engine VMs Between Projects
//
// A VM is migrated by stopping it, snapshotting each of its disks, turning the
// snapshots into images shared with the destination project, and recreating
// the VM there from those images. A batch mode discovers the VMs to move by
// label.
//
// The `gce-migrate` binary wraps this library with `vm`, `batch` and
// `discover` subcommands.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared HTTP client.
pub mod client;

/// Migration settings shared by every VM of a run.
pub mod config;

pub mod error;

/// Google Cloud Platform utilities: authentication and the Compute Engine API.
pub mod gcp;

/// The migration workflow, operation waiting, pacing and batch runs.
pub mod migrate;

/// Ctrl+C handling for long-running migrations.
pub mod shutdown;

pub use error::{Error, Result};

/// Last path segment of a resource URL (`.../zones/us-central1-a` -> `us-central1-a`).
pub fn last_segment(s: &str) -> &str {
    s.rsplit('/').next().unwrap_or(s)
}

/// Initialize tracing/logging. `RUST_LOG` takes precedence over `filter`.
pub fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
