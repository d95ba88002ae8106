//! Resource names generated during a migration.

use std::fmt;

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

/// Maximum length of a Compute Engine resource name.
pub const MAX_NAME_LEN: usize = 63;

/// Hex digits of the digest that replaces the cut-off end of a long name.
const DIGEST_LEN: usize = 6;

/// Per-migration identifier appended to snapshot and image names.
///
/// `<YYYYMMDD-HHMMSS>-<6 hex>`: the hex part is a digest of the source VM's
/// project, zone and name, so two VMs started in the same second still get
/// distinct ids, and re-running the same VM later gets a new timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationId(String);

impl MigrationId {
    pub fn new(project: &str, zone: &str, instance: &str, now: DateTime<Utc>) -> Self {
        let digest = Sha1::digest(format!("{}/{}/{}", project, zone, instance).as_bytes());
        let suffix = &hex::encode(digest)[..6];
        MigrationId(format!("{}-{}", now.format("%Y%m%d-%H%M%S"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn snapshot_name(&self, disk: &str) -> String {
        derived_name(disk, "snapshot", &self.0)
    }

    pub fn image_name(&self, disk: &str) -> String {
        derived_name(disk, "image", &self.0)
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the `index`-th data disk recreated for `instance`.
pub fn data_disk_name(instance: &str, index: usize) -> String {
    format!("{}-data-disk-{}", instance, index)
}

/// `<base>-<kind>-<id>`, shortening `base` when the result would exceed the
/// resource-name limit. `kind` and `id` are never shortened. A shortened base
/// ends in a digest of the full base, so distinct long names stay distinct.
fn derived_name(base: &str, kind: &str, id: &str) -> String {
    let tail = format!("-{}-{}", kind, id);
    let budget = MAX_NAME_LEN.saturating_sub(tail.len());
    if base.len() <= budget {
        return format!("{}{}", base, tail);
    }
    let digest = &hex::encode(Sha1::digest(base.as_bytes()))[..DIGEST_LEN];
    let keep = budget.saturating_sub(DIGEST_LEN + 1);
    let prefix = base[..keep].trim_end_matches('-');
    format!("{}-{}{}", prefix, digest, tail)
}
