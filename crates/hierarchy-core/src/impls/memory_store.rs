//! InMemoryStore - 開発・テスト用の key-value store
//!
//! # 実装詳細
//! - HashMap<String, Entry> を tokio の Mutex で保護
//! - expiry は読み込み時に遅延評価（期限切れは存在しない扱い）
//! - `atomic()` は書き込むキーの旧値だけを記録し、失敗したら戻す（all-or-nothing）
//! - 空になった list / sorted set / hash はキーごと消える

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{Command, KeyValueStore, Reply, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(Vec<String>),
    ZSet(HashMap<String, f64>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Hash(fields) => fields.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::ZSet(members) => members.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Entries = HashMap<String, Entry>;

#[derive(Debug, Default)]
struct StoreState {
    entries: Entries,
    /// Number of upcoming batches to reject.
    failing_batches: u32,
}

/// In-memory implementation of [`KeyValueStore`].
///
/// Cloning shares the underlying data, like a connection handle.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` batches with [`StoreError::Unavailable`]
    /// without applying them.
    pub async fn fail_next_batches(&self, n: u32) {
        self.state.lock().await.failing_batches = n;
    }

    /// Number of live keys (for testing).
    pub async fn key_count(&self) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }
}

fn live<'a>(entries: &'a Entries, key: &str, now: Instant) -> Option<&'a Entry> {
    entries.get(key).filter(|entry| !entry.is_expired(now))
}

fn live_mut<'a>(entries: &'a mut Entries, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn hash<'a>(
    entry: Option<&'a Entry>,
    key: &str,
) -> StoreResult<Option<&'a HashMap<String, String>>> {
    match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::Hash(fields)) => Ok(Some(fields)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn zset<'a>(
    entry: Option<&'a Entry>,
    key: &str,
) -> StoreResult<Option<&'a HashMap<String, f64>>> {
    match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::ZSet(members)) => Ok(Some(members)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

/// Members sorted ascending by score, ties broken by member.
fn sorted(members: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut sorted: Vec<(String, f64)> = members.iter().map(|(m, s)| (m.clone(), *s)).collect();
    sorted.sort_by(|a, b| match a.1.total_cmp(&b.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    sorted
}

/// Resolve possibly-negative ranks into an inclusive index range.
fn rank_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Get the entry at `key` for writing, creating it with `init` if absent.
fn entry_or<'a>(
    entries: &'a mut Entries,
    key: &str,
    now: Instant,
    init: fn() -> Value,
) -> &'a mut Entry {
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
    }
    entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: init(),
        expires_at: None,
    })
}

fn drop_if_empty(entries: &mut Entries, key: &str) {
    if entries.get(key).is_some_and(|entry| entry.value.is_empty()) {
        entries.remove(key);
    }
}

fn zset_mut<'a>(
    entries: &'a mut Entries,
    key: &str,
    now: Instant,
) -> StoreResult<Option<&'a mut HashMap<String, f64>>> {
    match live_mut(entries, key, now).map(|e| &mut e.value) {
        None => Ok(None),
        Some(Value::ZSet(members)) => Ok(Some(members)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

/// Keys a command may write.
fn written_keys(command: &Command) -> Vec<&str> {
    match command {
        Command::Del { keys } => keys.iter().map(String::as_str).collect(),
        Command::HSet { key, .. }
        | Command::Expire { key, .. }
        | Command::RPush { key, .. }
        | Command::ZAdd { key, .. }
        | Command::ZRem { key, .. }
        | Command::ZRemRangeByScore { key, .. }
        | Command::ZRemRangeByRank { key, .. } => vec![key.as_str()],
        Command::ZRangeByScore { .. } | Command::ZRange { .. } => Vec::new(),
    }
}

/// Previous entries of the keys a batch touched, for rollback.
#[derive(Default)]
struct UndoLog {
    saved: HashMap<String, Option<Entry>>,
}

impl UndoLog {
    fn record(&mut self, entries: &Entries, command: &Command) {
        for key in written_keys(command) {
            if !self.saved.contains_key(key) {
                self.saved.insert(key.to_string(), entries.get(key).cloned());
            }
        }
    }

    fn rollback(self, entries: &mut Entries) {
        for (key, entry) in self.saved {
            match entry {
                Some(entry) => entries.insert(key, entry),
                None => entries.remove(&key),
            };
        }
    }
}

fn apply(entries: &mut Entries, command: Command, now: Instant) -> StoreResult<Reply> {
    match command {
        Command::HSet { key, fields } => {
            let entry = entry_or(entries, &key, now, || Value::Hash(HashMap::new()));
            let Value::Hash(map) = &mut entry.value else {
                return Err(StoreError::WrongType(key));
            };
            let mut added = 0;
            for (field, value) in fields {
                if map.insert(field, value).is_none() {
                    added += 1;
                }
            }
            Ok(Reply::Count(added))
        }
        Command::Del { keys } => {
            let mut removed = 0;
            for key in keys {
                if live_mut(entries, &key, now).is_some() {
                    entries.remove(&key);
                    removed += 1;
                }
            }
            Ok(Reply::Count(removed))
        }
        Command::Expire { key, ttl } => match live_mut(entries, &key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(Reply::Bool(true))
            }
            None => Ok(Reply::Bool(false)),
        },
        Command::RPush { key, value } => {
            let entry = entry_or(entries, &key, now, || Value::List(Vec::new()));
            let Value::List(items) = &mut entry.value else {
                return Err(StoreError::WrongType(key));
            };
            items.push(value);
            Ok(Reply::Count(items.len() as u64))
        }
        Command::ZAdd { key, member, score } => {
            let entry = entry_or(entries, &key, now, || Value::ZSet(HashMap::new()));
            let Value::ZSet(members) = &mut entry.value else {
                return Err(StoreError::WrongType(key));
            };
            let added = members.insert(member, score).is_none();
            Ok(Reply::Count(u64::from(added)))
        }
        Command::ZRem { key, member } => {
            let removed = match zset_mut(entries, &key, now)? {
                Some(members) => members.remove(&member).is_some(),
                None => false,
            };
            drop_if_empty(entries, &key);
            Ok(Reply::Count(u64::from(removed)))
        }
        Command::ZRangeByScore { key, min, max } => {
            let members = zset(live(entries, &key, now), &key)?
                .map(sorted)
                .unwrap_or_default();
            Ok(Reply::Members(
                members
                    .into_iter()
                    .filter(|(_, score)| *score >= min && *score <= max)
                    .map(|(member, _)| member)
                    .collect(),
            ))
        }
        Command::ZRange { key, start, stop } => {
            let members = zset(live(entries, &key, now), &key)?
                .map(sorted)
                .unwrap_or_default();
            let selected = match rank_range(members.len(), start, stop) {
                Some((from, to)) => members[from..=to].iter().map(|(m, _)| m.clone()).collect(),
                None => Vec::new(),
            };
            Ok(Reply::Members(selected))
        }
        Command::ZRemRangeByScore { key, min, max } => {
            let removed = match zset_mut(entries, &key, now)? {
                Some(members) => {
                    let before = members.len();
                    members.retain(|_, score| *score < min || *score > max);
                    (before - members.len()) as u64
                }
                None => 0,
            };
            drop_if_empty(entries, &key);
            Ok(Reply::Count(removed))
        }
        Command::ZRemRangeByRank { key, start, stop } => {
            let removed = match zset_mut(entries, &key, now)? {
                Some(members) => {
                    let ordered = sorted(members);
                    match rank_range(ordered.len(), start, stop) {
                        Some((from, to)) => {
                            for (member, _) in &ordered[from..=to] {
                                members.remove(member);
                            }
                            (to - from + 1) as u64
                        }
                        None => 0,
                    }
                }
                None => 0,
            };
            drop_if_empty(entries, &key);
            Ok(Reply::Count(removed))
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let state = self.state.lock().await;
        let fields = hash(live(&state.entries, key, Instant::now()), key)?;
        Ok(fields.and_then(|fields| fields.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let state = self.state.lock().await;
        let fields = hash(live(&state.entries, key, Instant::now()), key)?;
        Ok(fields.cloned().unwrap_or_default())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(live(&state.entries, key, Instant::now()).is_some())
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        match live(&state.entries, key, Instant::now()).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items.clone()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let state = self.state.lock().await;
        let members = zset(live(&state.entries, key, Instant::now()), key)?;
        Ok(members.and_then(|members| members.get(member).copied()))
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        below: Option<f64>,
        limit: usize,
    ) -> StoreResult<Vec<(String, f64)>> {
        let state = self.state.lock().await;
        let Some(members) = zset(live(&state.entries, key, Instant::now()), key)? else {
            return Ok(Vec::new());
        };
        Ok(sorted(members)
            .into_iter()
            .rev()
            .filter(|(_, score)| below.is_none_or(|below| *score < below))
            .take(limit)
            .collect())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let state = self.state.lock().await;
        let members = zset(live(&state.entries, key, Instant::now()), key)?;
        Ok(members.map_or(0, |members| members.len() as u64))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let state = self.state.lock().await;
        let now = Instant::now();
        Ok(live(&state.entries, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn atomic(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>> {
        let mut state = self.state.lock().await;
        if state.failing_batches > 0 {
            state.failing_batches -= 1;
            return Err(StoreError::Unavailable("injected batch failure".to_string()));
        }

        let now = Instant::now();
        let mut undo = UndoLog::default();
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            undo.record(&state.entries, &command);
            match apply(&mut state.entries, command, now) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    undo.rollback(&mut state.entries);
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hset(key: &str, field: &str, value: &str) -> Command {
        Command::HSet {
            key: key.to_string(),
            fields: vec![(field.to_string(), value.to_string())],
        }
    }

    fn zadd(key: &str, member: &str, score: f64) -> Command {
        Command::ZAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn hash_fields_roundtrip() {
        let store = InMemoryStore::new();
        store.atomic(vec![hset("h", "a", "1")]).await.unwrap();

        assert_eq!(store.hget("h", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.hget("h", "b").await.unwrap(), None);
        assert!(store.exists("h").await.unwrap());
        assert_eq!(store.hgetall("h").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = InMemoryStore::new();
        store.atomic(vec![hset("h", "a", "1")]).await.unwrap();

        // The second command hits a hash with a list operation.
        let err = store
            .atomic(vec![
                hset("other", "x", "y"),
                Command::RPush {
                    key: "h".to_string(),
                    value: "v".to_string(),
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongType(_)));
        assert!(!store.exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn failed_batch_restores_touched_keys() {
        let store = InMemoryStore::new();
        store
            .atomic(vec![hset("h", "a", "1"), zadd("z", "m", 1.0)])
            .await
            .unwrap();

        let err = store
            .atomic(vec![
                hset("h", "a", "2"),
                Command::Del {
                    keys: vec!["z".to_string()],
                },
                zadd("z", "n", 2.0),
                Command::RPush {
                    key: "h".to_string(),
                    value: "v".to_string(),
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongType(_)));
        assert_eq!(store.hget("h", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.zscore("z", "m").await.unwrap(), Some(1.0));
        assert_eq!(store.zscore("z", "n").await.unwrap(), None);
        assert_eq!(store.key_count().await, 2);
    }

    #[tokio::test]
    async fn injected_failures_are_counted_down() {
        let store = InMemoryStore::new();
        store.fail_next_batches(1).await;

        let err = store.atomic(vec![hset("h", "a", "1")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(!store.exists("h").await.unwrap());

        store.atomic(vec![hset("h", "a", "1")]).await.unwrap();
        assert!(store.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn expire_sets_ttl_and_expired_keys_vanish() {
        let store = InMemoryStore::new();
        let replies = store
            .atomic(vec![
                hset("h", "a", "1"),
                Command::Expire {
                    key: "h".to_string(),
                    ttl: Duration::from_secs(60),
                },
                Command::Expire {
                    key: "missing".to_string(),
                    ttl: Duration::from_secs(60),
                },
            ])
            .await
            .unwrap();
        assert_eq!(replies[1], Reply::Bool(true));
        assert_eq!(replies[2], Reply::Bool(false));
        let ttl = store.ttl("h").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(59));

        store
            .atomic(vec![Command::Expire {
                key: "h".to_string(),
                ttl: Duration::ZERO,
            }])
            .await
            .unwrap();
        assert!(!store.exists("h").await.unwrap());
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let store = InMemoryStore::new();
        for value in ["a", "b", "a"] {
            store
                .atomic(vec![Command::RPush {
                    key: "l".to_string(),
                    value: value.to_string(),
                }])
                .await
                .unwrap();
        }
        assert_eq!(store.lrange("l").await.unwrap(), vec!["a", "b", "a"]);
        assert!(store.lrange("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zset_reverse_range_pages_below_cursor() {
        let store = InMemoryStore::new();
        store
            .atomic(vec![zadd("z", "a", 1.0), zadd("z", "b", 2.0), zadd("z", "c", 3.0)])
            .await
            .unwrap();

        let page = store.zrevrange_by_score("z", None, 2).await.unwrap();
        assert_eq!(page, vec![("c".to_string(), 3.0), ("b".to_string(), 2.0)]);

        let page = store.zrevrange_by_score("z", Some(2.0), 2).await.unwrap();
        assert_eq!(page, vec![("a".to_string(), 1.0)]);
        assert_eq!(store.zcard("z").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn zadd_refreshes_score() {
        let store = InMemoryStore::new();
        let replies = store
            .atomic(vec![zadd("z", "a", 1.0), zadd("z", "a", 5.0)])
            .await
            .unwrap();
        assert_eq!(replies, vec![Reply::Count(1), Reply::Count(0)]);
        assert_eq!(store.zscore("z", "a").await.unwrap(), Some(5.0));
        assert_eq!(store.zcard("z").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn range_reads_and_removals_by_score_and_rank() {
        let store = InMemoryStore::new();
        store
            .atomic((1..=5).map(|i| zadd("z", &format!("m{i}"), i as f64)).collect())
            .await
            .unwrap();

        let replies = store
            .atomic(vec![
                Command::ZRangeByScore {
                    key: "z".to_string(),
                    min: f64::NEG_INFINITY,
                    max: 2.0,
                },
                Command::ZRemRangeByScore {
                    key: "z".to_string(),
                    min: f64::NEG_INFINITY,
                    max: 2.0,
                },
            ])
            .await
            .unwrap();
        assert_eq!(replies[0].clone().into_members(), vec!["m1", "m2"]);
        assert_eq!(replies[1], Reply::Count(2));

        // keep only the newest entry: ranks 0 ..= -2
        let replies = store
            .atomic(vec![
                Command::ZRange {
                    key: "z".to_string(),
                    start: 0,
                    stop: -2,
                },
                Command::ZRemRangeByRank {
                    key: "z".to_string(),
                    start: 0,
                    stop: -2,
                },
            ])
            .await
            .unwrap();
        assert_eq!(replies[0].clone().into_members(), vec!["m3", "m4"]);
        assert_eq!(replies[1], Reply::Count(2));
        assert_eq!(store.zcard("z").await.unwrap(), 1);
        assert_eq!(store.zscore("z", "m5").await.unwrap(), Some(5.0));
    }

    #[test]
    fn rank_range_past_the_end_is_empty() {
        assert_eq!(rank_range(3, 0, -4), None);
        assert_eq!(rank_range(3, 0, 10), Some((0, 2)));
        assert_eq!(rank_range(0, 0, -1), None);
        assert_eq!(rank_range(3, -2, -1), Some((1, 2)));
    }

    #[tokio::test]
    async fn emptied_sorted_set_is_removed() {
        let store = InMemoryStore::new();
        store.atomic(vec![zadd("z", "a", 1.0)]).await.unwrap();
        store
            .atomic(vec![Command::ZRem {
                key: "z".to_string(),
                member: "a".to_string(),
            }])
            .await
            .unwrap();
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn del_reports_removed_keys() {
        let store = InMemoryStore::new();
        store
            .atomic(vec![hset("a", "f", "v"), hset("b", "f", "v")])
            .await
            .unwrap();
        let replies = store
            .atomic(vec![Command::Del {
                keys: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            }])
            .await
            .unwrap();
        assert_eq!(replies, vec![Reply::Count(2)]);
        assert_eq!(store.key_count().await, 0);
    }
}
