//! KeyValueStore port - 共有 key-value store の抽象化
//!
//! ツリー構造もステータス索引も、すべてここに永続化されます。
//! プロセス内にはツリーを保持しません。
//!
//! # 設計原則
//! - 書き込みは必ず `atomic()` のバッチで行う（半端な edge を見せない）
//! - 読み込みは 1 キー単位（ツリー全体のスナップショット整合性はない）
//! - リトライ方針は呼び出し側の責務

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// StoreError は key-value store の失敗
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Network failure, timeout, or an injected fault.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The key holds a value of a different shape.
    #[error("wrong value type at key {0}")]
    WrongType(String),

    #[error("{0}")]
    Other(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One operation inside an atomic batch.
///
/// Ranks are 0-based ascending by score; negative ranks count from the end
/// (`-1` is the highest score). Score bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set hash fields, creating the hash if needed.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Delete keys of any type.
    Del { keys: Vec<String> },
    /// Set (or refresh) the key's time to live.
    Expire { key: String, ttl: Duration },
    /// Append to the tail of a list.
    RPush { key: String, value: String },
    /// Add a member or refresh its score.
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem { key: String, member: String },
    /// Read members with `min <= score <= max`, ascending.
    ZRangeByScore { key: String, min: f64, max: f64 },
    /// Read members by rank, ascending.
    ZRange { key: String, start: i64, stop: i64 },
    ZRemRangeByScore { key: String, min: f64, max: f64 },
    ZRemRangeByRank { key: String, start: i64, stop: i64 },
}

/// Reply to a single [`Command`], in batch order.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    /// Number of elements added, removed, or keys deleted.
    Count(u64),
    /// Whether an expiry was set (false when the key does not exist).
    Bool(bool),
    Members(Vec<String>),
}

impl Reply {
    /// Members of a range read; empty for any other reply.
    pub fn into_members(self) -> Vec<String> {
        match self {
            Reply::Members(members) => members,
            _ => Vec::new(),
        }
    }
}

/// KeyValueStore は hash / list / sorted set を提供する外部ストア
///
/// # 前提
/// - キー単位で linearizable
/// - `atomic()` のバッチは all-or-nothing
/// - キーごとの expiry をサポート
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// All fields of a hash; empty when the key does not exist.
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Whole list, head first; empty when the key does not exist.
    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Members with score strictly below `below` (or any score when `None`),
    /// highest score first, at most `limit` of them.
    async fn zrevrange_by_score(
        &self,
        key: &str,
        below: Option<f64>,
        limit: usize,
    ) -> StoreResult<Vec<(String, f64)>>;

    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// Remaining time to live; `None` for a missing key or one without expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Apply every command or none of them.
    async fn atomic(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>>;
}
