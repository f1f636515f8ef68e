//! BoundedStatusCollection - 保持期間・件数上限つきの終端コレクション
//!
//! # 設計
//! - add の前に prune（age → count の順、閾値ごとに 1 バッチ）
//! - 追い出した workflow は木ごと削除
//! - running には使えない（構築時に InvalidConfig）

use async_trait::async_trait;
use tracing::{debug, info};

use super::cursor::CollectionCursor;
use super::status::{StatusCollection, WorkflowCollection};
use crate::app::Retention;
use crate::domain::{HierarchyError, Jid, Result, StatusCategory};
use crate::ports::{Command, Reply};

#[derive(Clone)]
pub struct BoundedStatusCollection {
    inner: StatusCollection,
    retention: Retention,
}

impl BoundedStatusCollection {
    pub fn new(inner: StatusCollection, retention: Retention) -> Result<Self> {
        if !inner.category().is_terminal() {
            return Err(HierarchyError::InvalidConfig(format!(
                "{} workflows are in flight and cannot be pruned",
                inner.category()
            )));
        }
        if retention.max_count == 0 {
            return Err(HierarchyError::InvalidConfig(
                "max_count must be at least 1".to_string(),
            ));
        }
        Ok(Self { inner, retention })
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    pub fn key(&self) -> &str {
        self.inner.key()
    }

    pub async fn score(&self, workflow: &Jid) -> Result<Option<f64>> {
        self.inner.score(workflow).await
    }

    /// Evict expired and excess entries and delete their trees.
    ///
    /// Leaves room for one more entry. Returns the evicted workflows.
    pub async fn prune(&self) -> Result<Vec<Jid>> {
        self.prune_except(None).await
    }

    /// Re-adding a current member does not grow the collection, so only
    /// entries beyond `max_count` are evicted in that case.
    async fn prune_except(&self, keep: Option<&Jid>) -> Result<Vec<Jid>> {
        let key = self.inner.key().to_string();
        let backend = self.inner.backend();
        let cutoff = backend.clock().score() - self.retention.max_age().as_secs_f64();

        let mut evicted = take_members(
            backend
                .store()
                .atomic(vec![
                    Command::ZRangeByScore {
                        key: key.clone(),
                        min: f64::NEG_INFINITY,
                        max: cutoff,
                    },
                    Command::ZRemRangeByScore {
                        key: key.clone(),
                        min: f64::NEG_INFINITY,
                        max: cutoff,
                    },
                ])
                .await?,
        );

        // newest max_count - 1 survive, or max_count when re-adding a member
        let present = match keep {
            Some(workflow) => self.inner.score(workflow).await?.is_some(),
            None => false,
        };
        let survivors = if present {
            self.retention.max_count.saturating_add(1)
        } else {
            self.retention.max_count
        };
        let stop = -i64::try_from(survivors).unwrap_or(i64::MAX);
        evicted.extend(take_members(
            backend
                .store()
                .atomic(vec![
                    Command::ZRange {
                        key: key.clone(),
                        start: 0,
                        stop,
                    },
                    Command::ZRemRangeByRank {
                        key: key.clone(),
                        start: 0,
                        stop,
                    },
                ])
                .await?,
        ));

        let mut deleted = Vec::with_capacity(evicted.len());
        for workflow in evicted {
            if keep == Some(&workflow) {
                continue;
            }
            backend.delete_tree(&workflow).await?;
            deleted.push(workflow);
        }
        if !deleted.is_empty() {
            info!(
                collection = %self.inner.category(),
                evicted = deleted.len(),
                "pruned workflows"
            );
        }
        Ok(deleted)
    }
}

fn take_members(replies: Vec<Reply>) -> Vec<Jid> {
    replies
        .into_iter()
        .next()
        .map(Reply::into_members)
        .unwrap_or_default()
        .into_iter()
        .map(Jid::new)
        .collect()
}

#[async_trait]
impl WorkflowCollection for BoundedStatusCollection {
    fn category(&self) -> StatusCategory {
        self.inner.category()
    }

    async fn add(&self, workflow: &Jid) -> Result<()> {
        let evicted = self.prune_except(Some(workflow)).await?;
        debug!(workflow = %workflow, evicted = evicted.len(), "pruned before insert");
        self.inner.add(workflow).await
    }

    async fn contains(&self, workflow: &Jid) -> Result<bool> {
        self.inner.contains(workflow).await
    }

    async fn remove(&self, workflow: &Jid) -> Result<()> {
        self.inner.remove(workflow).await
    }

    async fn detach(&self, workflow: &Jid) -> Result<bool> {
        self.inner.detach(workflow).await
    }

    async fn size(&self) -> Result<u64> {
        self.inner.size().await
    }

    fn each(&self) -> CollectionCursor {
        self.inner.each()
    }
}
