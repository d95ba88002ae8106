//! # Google Compute Engine (GCE) Client
//!
//! The subset of the Compute Engine v1 API a migration needs, behind the
//! [`Compute`] trait so the workflow can run against the REST client or an
//! in-memory fake.
//!
//! ## Submodules
//! - `client`: REST implementation of [`Compute`].
//! - `compute`: the trait itself.
//! - `defaults`: request bodies and resource paths.
//! - `types`: data structures serialized to and deserialized from the API.

/// REST client for the GCE API.
pub mod client;
/// Control-plane operations used by the migration workflow.
pub mod compute;
/// Helper functions for building GCE request bodies.
pub mod defaults;
/// Data structures for the GCE API.
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use crate::gcp::gce::client::GceClient;
pub use crate::gcp::gce::compute::Compute;
pub use crate::gcp::gce::types::*;
