//! Store key layout.
//!
//! - `{prefix}:job:{jid}` (HASH): parent, status, metadata
//! - `{prefix}:children:{jid}` (LIST): child jids in insertion order
//! - `{prefix}:workflows:{category}` (ZSET): root jids, score = insertion time

use crate::domain::{Jid, StatusCategory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn job(&self, jid: &Jid) -> String {
        format!("{}:job:{}", self.prefix, jid)
    }

    pub fn children(&self, jid: &Jid) -> String {
        format!("{}:children:{}", self.prefix, jid)
    }

    pub fn collection(&self, category: StatusCategory) -> String {
        format!("{}:workflows:{}", self.prefix, category)
    }
}
