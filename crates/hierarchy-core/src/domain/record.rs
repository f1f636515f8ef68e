//! Job record: typed view of the persisted job hash.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::errors::{HierarchyError, Result};
use super::ids::Jid;
use super::status::JobStatus;

/// Field holding the parent jid (absent for a root).
pub const PARENT_FIELD: &str = "parent";

/// Field holding the persisted [`JobStatus`].
pub const STATUS_FIELD: &str = "status";

/// Prefix of caller-supplied metadata fields.
pub const METADATA_PREFIX: &str = "meta:";

/// Typed view of a job record.
///
/// The store keeps a flat hash; this is what callers see instead of it.
/// Metadata is opaque to this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub parent: Option<Jid>,
    pub status: Option<JobStatus>,
    pub metadata: BTreeMap<String, String>,
}

impl JobRecord {
    /// Rebuild a record from raw hash fields.
    ///
    /// Unknown non-metadata fields are ignored; an unparseable status is a
    /// structural anomaly.
    pub fn from_fields(fields: HashMap<String, String>) -> Result<Self> {
        let mut record = JobRecord::default();
        for (field, value) in fields {
            if field == PARENT_FIELD {
                record.parent = Some(Jid::new(value));
            } else if field == STATUS_FIELD {
                record.status = Some(value.parse()?);
            } else if let Some(name) = field.strip_prefix(METADATA_PREFIX) {
                record.metadata.insert(name.to_string(), value);
            }
        }
        Ok(record)
    }
}

/// Hash field name for a metadata entry.
pub fn metadata_field(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(HierarchyError::PreconditionViolation(
            "metadata field name must not be empty".to_string(),
        ));
    }
    Ok(format!("{METADATA_PREFIX}{name}"))
}
