//! Job identifiers.
//!
//! jid は job-processing system が投入時に割り当てる不透明な文字列です。
//! この crate は中身を解釈せず、比較・表示・キー生成にのみ使います。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a job node (and of a workflow, which is named by its root).
///
/// Opaque: ordering and equality are plain string comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Jid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Jid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Jid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_is_the_raw_identifier() {
        let jid = Jid::new("a1b2c3");
        assert_eq!(jid.to_string(), "a1b2c3");
        assert_eq!(jid.as_str(), "a1b2c3");
    }

    #[test]
    fn serializes_as_plain_string() {
        let jid = Jid::from("abc");
        assert_eq!(serde_json::to_string(&jid).unwrap(), "\"abc\"");
        let back: Jid = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, jid);
    }

    #[test]
    fn can_be_looked_up_by_str() {
        let mut set = HashSet::new();
        set.insert(Jid::from("x"));
        assert!(set.contains("x"));
    }
}
