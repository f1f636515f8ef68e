//! StatusCollection - workflow の状態別索引
//!
//! 1 カテゴリ = 1 sorted set（member = root jid, score = 挿入時刻）。

use async_trait::async_trait;
use tracing::debug;

use super::cursor::CollectionCursor;
use crate::app::Backend;
use crate::domain::{HierarchyError, Jid, Result, StatusCategory};
use crate::ports::{Command, Reply};

/// Common interface of the running / complete / failed indexes.
#[async_trait]
pub trait WorkflowCollection: Send + Sync {
    fn category(&self) -> StatusCategory;

    /// Insert with score = now; re-adding refreshes the score.
    async fn add(&self, workflow: &Jid) -> Result<()>;

    async fn contains(&self, workflow: &Jid) -> Result<bool>;

    /// Remove the index entry of a workflow whose record is already gone.
    ///
    /// Fails with `PreconditionViolation` while the root record still
    /// exists.
    async fn remove(&self, workflow: &Jid) -> Result<()>;

    /// Drop the entry without the existence check. Returns whether it was
    /// present.
    async fn detach(&self, workflow: &Jid) -> Result<bool>;

    async fn size(&self) -> Result<u64>;

    /// Newest-first iteration.
    fn each(&self) -> CollectionCursor;

    /// Remove `workflow` from every source of another category, then add it
    /// here.
    ///
    /// The removals and the insertion are separate store batches: a failure
    /// in between leaves the workflow in no collection, and a concurrent
    /// mover may leave it in two. The next status notification for the
    /// workflow converges it. A server-side script doing both steps at once
    /// would close the window.
    async fn move_from(
        &self,
        workflow: &Jid,
        sources: &[&dyn WorkflowCollection],
    ) -> Result<()> {
        for source in sources {
            if source.category() != self.category() {
                source.detach(workflow).await?;
            }
        }
        self.add(workflow).await
    }
}

/// Unbounded status collection.
#[derive(Clone)]
pub struct StatusCollection {
    backend: Backend,
    category: StatusCategory,
    key: String,
}

impl StatusCollection {
    pub fn new(backend: Backend, category: StatusCategory) -> Self {
        let key = backend.keys().collection(category);
        Self {
            backend,
            category,
            key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Score of a member; `None` when absent.
    pub async fn score(&self, workflow: &Jid) -> Result<Option<f64>> {
        Ok(self
            .backend
            .store()
            .zscore(&self.key, workflow.as_str())
            .await?)
    }
}

#[async_trait]
impl WorkflowCollection for StatusCollection {
    fn category(&self) -> StatusCategory {
        self.category
    }

    async fn add(&self, workflow: &Jid) -> Result<()> {
        let score = self.backend.clock().score();
        self.backend
            .store()
            .atomic(vec![Command::ZAdd {
                key: self.key.clone(),
                member: workflow.to_string(),
                score,
            }])
            .await?;
        debug!(collection = %self.category, workflow = %workflow, score, "added workflow");
        Ok(())
    }

    async fn contains(&self, workflow: &Jid) -> Result<bool> {
        Ok(self.score(workflow).await?.is_some())
    }

    async fn remove(&self, workflow: &Jid) -> Result<()> {
        if self.backend.job_exists(workflow).await? {
            return Err(HierarchyError::PreconditionViolation(format!(
                "workflow {workflow} still exists; delete it before removing it from {}",
                self.category
            )));
        }
        self.detach(workflow).await?;
        Ok(())
    }

    async fn detach(&self, workflow: &Jid) -> Result<bool> {
        let replies = self
            .backend
            .store()
            .atomic(vec![Command::ZRem {
                key: self.key.clone(),
                member: workflow.to_string(),
            }])
            .await?;
        let removed = matches!(replies.first(), Some(Reply::Count(n)) if *n > 0);
        if removed {
            debug!(collection = %self.category, workflow = %workflow, "detached workflow");
        }
        Ok(removed)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.backend.store().zcard(&self.key).await?)
    }

    fn each(&self) -> CollectionCursor {
        CollectionCursor::new(
            self.backend.shared_store(),
            self.key.clone(),
            self.backend.config().page_size,
        )
    }
}
