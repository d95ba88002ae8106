//! Error types for migration operations

use std::time::Duration;

use thiserror::Error;

use crate::gcp::gce::types::OperationError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// API error reasons Compute Engine uses when a caller is being throttled.
const RATE_LIMIT_REASONS: [&str; 3] = ["rateLimitExceeded", "userRateLimitExceeded", "quotaExceeded"];

#[derive(Error, Debug)]
pub enum Error {
    #[error("operation {name} failed: {error}")]
    OperationFailed { name: String, error: OperationError },

    #[error("operation {name} did not finish within {timeout:?}")]
    OperationTimedOut { name: String, timeout: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("boot image not found for instance {0}; cannot create VM")]
    BootImageMissing(String),

    #[error("instance {instance} has {count} boot disks; cannot choose a boot image")]
    MultipleBootImages { instance: String, count: usize },

    #[error("{method} {url} returned {status}: {body}")]
    Api {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authentication failed: {0:#}")]
    Auth(anyhow::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the control plane rejected the request for rate or quota reasons.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::Api { status: 429, .. } => true,
            Error::Api {
                status: 403, body, ..
            } => RATE_LIMIT_REASONS
                .iter()
                .any(|reason| body.contains(&format!("\"{}\"", reason))),
            _ => false,
        }
    }
}
