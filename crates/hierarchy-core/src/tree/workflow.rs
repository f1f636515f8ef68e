//! Workflow - 木の root を単位とした集約ビュー

use tracing::debug;

use super::node::JobNode;
use crate::app::{Tracker, WalkMode};
use crate::collections::{CollectionCursor, WorkflowCollection};
use crate::domain::record::STATUS_FIELD;
use crate::domain::{HierarchyError, Jid, JobStatus, Result, WorkflowStatus};

/// A job tree, named by its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    root: JobNode,
}

impl Workflow {
    /// The workflow `job` belongs to.
    pub async fn find(job: &JobNode) -> Result<Self> {
        Ok(Self {
            root: job.root().await?,
        })
    }

    /// Wrap a jid known to be a root (e.g. read back from a collection).
    pub(crate) fn from_root(root: JobNode) -> Self {
        Self { root }
    }

    pub fn jid(&self) -> &Jid {
        self.root.jid()
    }

    pub fn root(&self) -> &JobNode {
        &self.root
    }

    /// Aggregate status over every node of the tree.
    ///
    /// One status read per node; not a snapshot.
    pub async fn status(&self) -> Result<WorkflowStatus> {
        let backend = self.root.tracker().backend();
        if !backend.job_exists(self.jid()).await? {
            return Err(HierarchyError::NotFound(self.jid().clone()));
        }

        let entries = backend.subtree(self.jid(), WalkMode::Strict).await?;
        let mut statuses = Vec::with_capacity(entries.len());
        for entry in &entries {
            let status = backend
                .store()
                .hget(&backend.keys().job(&entry.jid), STATUS_FIELD)
                .await?
                .map(|value| value.parse::<JobStatus>())
                .transpose()?;
            statuses.push(status);
        }
        Ok(WorkflowStatus::aggregate(statuses))
    }

    /// Every job of the tree, root first.
    pub async fn jobs(&self) -> Result<Vec<JobNode>> {
        self.root.descendants().await
    }

    /// The collection this workflow belongs in, derived from its status.
    pub async fn current_collection(&self) -> Result<&dyn WorkflowCollection> {
        let category = self.status().await?.category();
        Ok(self.root.tracker().collection(category))
    }

    /// Delete every record of the tree in one batch.
    ///
    /// Collection entries are left in place; drop them with
    /// [`WorkflowCollection::remove`] afterwards.
    pub async fn delete_tree(&self) -> Result<usize> {
        let deleted = self.root.tracker().backend().delete_tree(self.jid()).await?;
        debug!(workflow = %self.jid(), deleted, "deleted workflow");
        Ok(deleted)
    }
}

/// Newest-first iteration over a collection, yielding workflows.
pub struct WorkflowCursor {
    inner: CollectionCursor,
    tracker: Tracker,
}

impl WorkflowCursor {
    pub(crate) fn new(inner: CollectionCursor, tracker: Tracker) -> Self {
        Self { inner, tracker }
    }

    pub async fn next(&mut self) -> Result<Option<Workflow>> {
        Ok(self
            .inner
            .next()
            .await?
            .map(|jid| Workflow::from_root(self.tracker.job(jid))))
    }

    pub async fn collect_all(mut self) -> Result<Vec<Workflow>> {
        let mut all = Vec::new();
        while let Some(workflow) = self.next().await? {
            all.push(workflow);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{TestTracker, test_tracker};
    use crate::domain::StatusCategory;
    use chrono::Duration;
    use rstest::rstest;
    use std::collections::BTreeMap;

    use JobStatus::*;

    async fn job(t: &TestTracker, jid: &str) -> JobNode {
        t.tracker.create_job(jid, BTreeMap::new()).await.unwrap()
    }

    /// root with two leaves, statuses applied in order root, left, right.
    async fn three_node_tree(t: &TestTracker, statuses: [JobStatus; 3]) -> Workflow {
        let root = job(t, "r").await;
        let left = job(t, "l").await;
        let right = job(t, "x").await;
        root.add_child(&left).await.unwrap();
        root.add_child(&right).await.unwrap();
        for (node, status) in [&root, &left, &right].into_iter().zip(statuses) {
            let transition = match status {
                Queued => node.enqueue().await,
                Running => node.run().await,
                Complete => node.complete().await,
                Requeued => node.requeue().await,
                Failed => node.fail().await,
            };
            transition.unwrap();
        }
        left.workflow().await.unwrap()
    }

    #[rstest]
    #[case::single_failed_leaf([Complete, Complete, Failed], WorkflowStatus::Failed)]
    #[case::all_complete([Complete, Complete, Complete], WorkflowStatus::Complete)]
    #[case::one_running([Running, Complete, Queued], WorkflowStatus::Running)]
    #[case::partially_complete([Complete, Queued, Queued], WorkflowStatus::Running)]
    #[case::retrying([Running, Requeued, Complete], WorkflowStatus::Running)]
    #[case::nothing_started([Queued, Queued, Queued], WorkflowStatus::Queued)]
    #[tokio::test]
    async fn aggregate_over_the_tree(
        #[case] statuses: [JobStatus; 3],
        #[case] expected: WorkflowStatus,
    ) {
        let t = test_tracker();
        let workflow = three_node_tree(&t, statuses).await;
        assert_eq!(workflow.jid().as_str(), "r");
        assert_eq!(workflow.status().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn current_collection_follows_status() {
        let t = test_tracker();
        let workflow = three_node_tree(&t, [Complete, Complete, Failed]).await;
        assert_eq!(
            workflow.current_collection().await.unwrap().category(),
            StatusCategory::Failed
        );

        let t = test_tracker();
        let workflow = three_node_tree(&t, [Queued, Queued, Queued]).await;
        assert_eq!(
            workflow.current_collection().await.unwrap().category(),
            StatusCategory::Running
        );
    }

    #[tokio::test]
    async fn status_of_deleted_workflow_is_not_found() {
        let t = test_tracker();
        let workflow = three_node_tree(&t, [Complete, Complete, Complete]).await;
        assert_eq!(workflow.jobs().await.unwrap().len(), 3);

        assert_eq!(workflow.delete_tree().await.unwrap(), 3);
        assert!(workflow.status().await.unwrap_err().is_not_found());
        assert_eq!(t.store.key_count().await, 0);
    }

    #[tokio::test]
    async fn cursor_yields_workflow_handles() {
        let t = test_tracker();
        for jid in ["a", "b", "c"] {
            let node = job(&t, jid).await;
            t.tracker
                .collection(StatusCategory::Running)
                .add(node.jid())
                .await
                .unwrap();
            t.clock.advance(Duration::milliseconds(1));
        }

        let workflows = t
            .tracker
            .workflows(StatusCategory::Running)
            .collect_all()
            .await
            .unwrap();
        let jids: Vec<&str> = workflows.iter().map(|w| w.jid().as_str()).collect();
        assert_eq!(jids, vec!["c", "b", "a"]);
    }
}
