//! Errors - エラー型と分類
//!
//! HierarchyError は呼び出し側に返すすべての失敗を表します。
//! ErrorKind は運用上の分類（リトライすべきか）を提供します。

use thiserror::Error;

use super::ids::Jid;
use crate::ports::StoreError;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（key-value store の障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// HierarchyError はドメインエラー
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// A referenced job has no backing record.
    #[error("job not found: {0}")]
    NotFound(Jid),

    /// The operation is illegal in the current state.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Cycle, dangling child reference, or corrupt field in stored data.
    #[error("structural anomaly: {0}")]
    StructuralAnomaly(String),

    /// The key-value store failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HierarchyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HierarchyError::Store(StoreError::Unavailable(_)) => ErrorKind::Transient,
            HierarchyError::Store(_) => ErrorKind::Infrastructure,
            HierarchyError::NotFound(_)
            | HierarchyError::PreconditionViolation(_)
            | HierarchyError::StructuralAnomaly(_)
            | HierarchyError::InvalidConfig(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HierarchyError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, HierarchyError>;
