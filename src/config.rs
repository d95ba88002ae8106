//! Migration configuration, built once at startup and shared read-only by the
//! workflow and discovery.

use crate::error::{Error, Result};
use crate::migrate::{MigrationRequest, RateLimitPolicy, WaitPolicy};

pub const DEFAULT_IMAGE_LOCATION: &str = "us";
pub const DEFAULT_LABEL_FILTER: &str = "labels.migrate=true";
pub const DEFAULT_NAME_PREFIX: &str = "migrated-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub source_project: String,
    pub destination_project: String,
    /// Numeric id of the destination project; names its Compute Engine service agent.
    pub destination_project_number: String,
    pub destination_zone: String,
    pub network: String,
    pub subnet: String,
    /// Storage location of the intermediate images (multi-region or region).
    pub image_location: String,
    /// `instances.aggregatedList` filter selecting VMs for a batch run.
    pub label_filter: String,
    /// Prepended to a discovered VM's name to name its replacement.
    pub name_prefix: String,
    pub wait: WaitPolicy,
    pub rate_limit: RateLimitPolicy,
}

impl MigrationConfig {
    pub fn new(
        source_project: &str,
        destination_project: &str,
        destination_project_number: &str,
        destination_zone: &str,
        network: &str,
        subnet: &str,
    ) -> Self {
        MigrationConfig {
            source_project: source_project.to_string(),
            destination_project: destination_project.to_string(),
            destination_project_number: destination_project_number.to_string(),
            destination_zone: destination_zone.to_string(),
            network: network.to_string(),
            subnet: subnet.to_string(),
            image_location: DEFAULT_IMAGE_LOCATION.to_string(),
            label_filter: DEFAULT_LABEL_FILTER.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            wait: WaitPolicy::default(),
            rate_limit: RateLimitPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("source project", &self.source_project),
            ("destination project", &self.destination_project),
            ("destination project number", &self.destination_project_number),
            ("destination zone", &self.destination_zone),
            ("network", &self.network),
            ("subnet", &self.subnet),
            ("image location", &self.image_location),
        ];
        for (what, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{} is empty", what)));
            }
        }
        if !self
            .destination_project_number
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            return Err(Error::InvalidConfig(format!(
                "destination project number must be numeric, got '{}'",
                self.destination_project_number
            )));
        }
        if !self.destination_zone.contains('-') {
            return Err(Error::InvalidConfig(format!(
                "destination zone '{}' has no region part",
                self.destination_zone
            )));
        }
        if self.wait.interval > self.wait.timeout {
            return Err(Error::InvalidConfig(
                "poll interval is longer than the operation timeout".to_string(),
            ));
        }
        if self.rate_limit.floor > self.rate_limit.ceiling {
            return Err(Error::InvalidConfig(
                "rate-limit floor is above its ceiling".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the request to migrate `source_instance` from `source_zone`
    /// into `target_instance` in the destination project.
    pub fn request(
        &self,
        source_zone: &str,
        source_instance: &str,
        target_instance: &str,
        machine_type: Option<&str>,
    ) -> MigrationRequest {
        MigrationRequest {
            source_project: self.source_project.clone(),
            source_zone: source_zone.to_string(),
            source_instance: source_instance.to_string(),
            destination_project: self.destination_project.clone(),
            destination_zone: self.destination_zone.clone(),
            machine_type: machine_type.map(str::to_string),
            target_instance: target_instance.to_string(),
            network: self.network.clone(),
            subnet: self.subnet.clone(),
        }
    }

    /// Name given to the replacement of a discovered VM.
    pub fn target_name(&self, source_instance: &str) -> String {
        format!("{}{}", self.name_prefix, source_instance)
    }
}
