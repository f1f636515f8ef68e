//! Tracker configuration.
//!
//! Values are supplied by the host process; this crate only parses and
//! validates them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{HierarchyError, Result, StatusCategory};

const DAY_SECS: u64 = 24 * 60 * 60;

/// What `add_child` does when the child is already listed under the parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateChildPolicy {
    /// Append again; the children list then holds the jid twice.
    #[default]
    Append,

    /// Check the children list first and skip the write if present.
    /// The check and the write are separate round trips.
    Ignore,
}

/// Bounded retention for a terminal status collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
    /// Entries older than this are evicted.
    pub max_age_secs: u64,

    /// The collection never holds more than this many entries.
    pub max_count: u64,
}

impl Retention {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_age_secs: 180 * DAY_SECS,
            max_count: 10_000,
        }
    }
}

/// Configuration for a [`Tracker`](crate::app::Tracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Namespace prepended to every store key.
    pub key_prefix: String,

    /// Sliding expiry of job records and children lists.
    pub ttl_secs: u64,

    /// Batch size used when iterating a status collection.
    pub page_size: usize,

    /// Walks deeper than this are reported as structural anomalies.
    pub max_tree_depth: usize,

    pub duplicate_child_policy: DuplicateChildPolicy,

    pub complete_retention: Retention,

    pub failed_retention: Retention,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            key_prefix: "hierarchy".to_string(),
            ttl_secs: 30 * DAY_SECS,
            page_size: 100,
            max_tree_depth: 1024,
            duplicate_child_policy: DuplicateChildPolicy::Append,
            complete_retention: Retention::default(),
            failed_retention: Retention::default(),
        }
    }
}

impl HierarchyConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HierarchyError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(HierarchyError::InvalidConfig(msg.to_string()));
        if self.key_prefix.is_empty() {
            return invalid("key_prefix must not be empty");
        }
        if self.ttl_secs == 0 {
            return invalid("ttl_secs must be positive");
        }
        if self.page_size == 0 {
            return invalid("page_size must be positive");
        }
        if self.max_tree_depth == 0 {
            return invalid("max_tree_depth must be positive");
        }
        for (name, retention) in [
            ("complete_retention", &self.complete_retention),
            ("failed_retention", &self.failed_retention),
        ] {
            if retention.max_count == 0 {
                return Err(HierarchyError::InvalidConfig(format!(
                    "{name}.max_count must be at least 1"
                )));
            }
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Retention of a category; `None` for the unbounded running index.
    pub fn retention(&self, category: StatusCategory) -> Option<Retention> {
        match category {
            StatusCategory::Running => None,
            StatusCategory::Complete => Some(self.complete_retention),
            StatusCategory::Failed => Some(self.failed_retention),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = HierarchyConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(30 * DAY_SECS));
        assert_eq!(config.page_size, 100);
        assert_eq!(config.duplicate_child_policy, DuplicateChildPolicy::Append);
        assert!(config.retention(StatusCategory::Running).is_none());
        assert_eq!(
            config.retention(StatusCategory::Failed).unwrap().max_count,
            10_000
        );
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = HierarchyConfig::from_json_str(
            r#"{
                "key_prefix": "app",
                "duplicate_child_policy": "ignore",
                "complete_retention": { "max_count": 50 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.key_prefix, "app");
        assert_eq!(config.duplicate_child_policy, DuplicateChildPolicy::Ignore);
        assert_eq!(config.complete_retention.max_count, 50);
        assert_eq!(
            config.complete_retention.max_age_secs,
            Retention::default().max_age_secs
        );
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn rejects_zero_sizes() {
        let err = HierarchyConfig::from_json_str(r#"{ "page_size": 0 }"#).unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidConfig(_)));

        let err = HierarchyConfig::from_json_str(r#"{ "failed_retention": { "max_count": 0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("failed_retention"));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = HierarchyConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidConfig(_)));
    }
}
