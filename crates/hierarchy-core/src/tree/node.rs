//! JobNode - store 上の 1 ジョブへのハンドル
//!
//! # 設計
//! - ハンドルは jid だけを持つ（状態は常に store が正）
//! - 1 レコードへの書き込みは必ず 1 つの atomic batch（値 + expiry 更新）
//! - 木の走査は反復 + visited set + 深さ上限（循環・破損データで止まらないことを防ぐ）
//! - root は一度求めたらハンドル単位でメモ化（既存の木の root は変わらない）

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use tracing::{debug, warn};

use super::workflow::Workflow;
use crate::app::{Backend, DuplicateChildPolicy, Tracker, WalkMode};
use crate::domain::record::{PARENT_FIELD, STATUS_FIELD, metadata_field};
use crate::domain::{
    HierarchyError, Jid, JobRecord, JobStatus, JobStatusChange, Notification, Result, Topic,
    WorkflowStatus, WorkflowStatusChange,
};
use crate::notify::DeliveryFailure;
use crate::ports::Command;

/// Outcome of a status transition.
///
/// The status write is committed before any notification goes out;
/// `failed_deliveries` lists subscribers that errored afterwards.
#[derive(Debug)]
pub struct Transition {
    pub jid: Jid,
    pub status: JobStatus,
    pub previous: Option<JobStatus>,

    /// Set when the workflow's aggregate status changed with this write.
    pub workflow: Option<WorkflowStatusChange>,

    pub failed_deliveries: Vec<DeliveryFailure>,
}

impl Transition {
    /// Every subscriber accepted its notification.
    pub fn is_delivered(&self) -> bool {
        self.failed_deliveries.is_empty()
    }
}

/// Handle to one job node.
///
/// Cheap to create: [`JobNode::find`] does not touch the store. Reads fail
/// with `NotFound` once the record is required and absent.
#[derive(Clone)]
pub struct JobNode {
    jid: Jid,
    tracker: Tracker,
    root: OnceLock<Jid>,
}

impl std::fmt::Debug for JobNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobNode").field("jid", &self.jid).finish()
    }
}

impl PartialEq for JobNode {
    fn eq(&self, other: &Self) -> bool {
        self.jid == other.jid
    }
}

impl Eq for JobNode {}

impl JobNode {
    /// Write a queued record with `metadata`.
    ///
    /// Re-creating an existing jid resets its status and merges metadata;
    /// parent and children edges are left alone.
    pub async fn create(
        tracker: &Tracker,
        jid: impl Into<Jid>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        let node = Self::find(tracker, jid);
        let mut fields = Vec::with_capacity(metadata.len() + 1);
        fields.push((STATUS_FIELD.to_string(), JobStatus::Queued.to_string()));
        for (name, value) in metadata {
            fields.push((metadata_field(&name)?, value));
        }
        node.write_fields(fields).await?;
        debug!(jid = %node.jid, "created job");
        Ok(node)
    }

    pub fn find(tracker: &Tracker, jid: impl Into<Jid>) -> Self {
        Self {
            jid: jid.into(),
            tracker: tracker.clone(),
            root: OnceLock::new(),
        }
    }

    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn backend(&self) -> &Backend {
        self.tracker.backend()
    }

    fn sibling(&self, jid: Jid) -> Self {
        Self::find(&self.tracker, jid)
    }

    pub async fn exists(&self) -> Result<bool> {
        self.backend().job_exists(&self.jid).await
    }

    async fn ensure_exists(&self) -> Result<()> {
        if self.exists().await? {
            Ok(())
        } else {
            Err(HierarchyError::NotFound(self.jid.clone()))
        }
    }

    /// Typed view of the whole record.
    pub async fn record(&self) -> Result<JobRecord> {
        let fields = self
            .backend()
            .store()
            .hgetall(&self.backend().keys().job(&self.jid))
            .await?;
        if fields.is_empty() {
            return Err(HierarchyError::NotFound(self.jid.clone()));
        }
        JobRecord::from_fields(fields)
    }

    /// One raw field; absent field of an existing record is `None`.
    async fn field(&self, field: &str) -> Result<Option<String>> {
        let backend = self.backend();
        let value = backend
            .store()
            .hget(&backend.keys().job(&self.jid), field)
            .await?;
        if value.is_none() {
            self.ensure_exists().await?;
        }
        Ok(value)
    }

    /// Set fields and refresh the record's expiry in one batch.
    async fn write_fields(&self, fields: Vec<(String, String)>) -> Result<()> {
        let backend = self.backend();
        let key = backend.keys().job(&self.jid);
        backend
            .store()
            .atomic(vec![
                Command::HSet {
                    key: key.clone(),
                    fields,
                },
                Command::Expire {
                    key,
                    ttl: backend.config().ttl(),
                },
            ])
            .await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<Option<JobStatus>> {
        self.field(STATUS_FIELD)
            .await?
            .map(|value| value.parse())
            .transpose()
    }

    pub async fn metadata(&self, name: &str) -> Result<Option<String>> {
        self.field(&metadata_field(name)?).await
    }

    pub async fn set_metadata(&self, name: &str, value: impl Into<String>) -> Result<()> {
        self.update_metadata(BTreeMap::from([(name.to_string(), value.into())]))
            .await
    }

    /// Write several metadata fields in one batch.
    pub async fn update_metadata(&self, metadata: BTreeMap<String, String>) -> Result<()> {
        if metadata.is_empty() {
            return Ok(());
        }
        self.ensure_exists().await?;
        let fields = metadata
            .into_iter()
            .map(|(name, value)| Ok((metadata_field(&name)?, value)))
            .collect::<Result<Vec<_>>>()?;
        self.write_fields(fields).await
    }

    /// Parent node; `None` for a root.
    ///
    /// A parent jid whose record has expired is `NotFound`.
    pub async fn parent(&self) -> Result<Option<JobNode>> {
        let Some(parent) = self.field(PARENT_FIELD).await? else {
            return Ok(None);
        };
        let parent = self.sibling(Jid::new(parent));
        parent.ensure_exists().await?;
        Ok(Some(parent))
    }

    /// Children in insertion order, duplicates included.
    pub async fn children(&self) -> Result<Vec<JobNode>> {
        let backend = self.backend();
        Ok(backend
            .store()
            .lrange(&backend.keys().children(&self.jid))
            .await?
            .into_iter()
            .map(|jid| self.sibling(Jid::new(jid)))
            .collect())
    }

    pub async fn is_root(&self) -> Result<bool> {
        Ok(self.field(PARENT_FIELD).await?.is_none())
    }

    pub async fn is_leaf(&self) -> Result<bool> {
        self.ensure_exists().await?;
        Ok(self.children().await?.is_empty())
    }

    /// Follow parent links to the root; memoized per handle.
    ///
    /// A cycle or a chain longer than `max_tree_depth` is a
    /// `StructuralAnomaly`.
    pub async fn root(&self) -> Result<JobNode> {
        if let Some(root) = self.root.get() {
            return Ok(self.sibling(root.clone()));
        }

        let max_depth = self.backend().config().max_tree_depth;
        let mut current = self.clone();
        let mut visited = HashSet::from([self.jid.clone()]);
        loop {
            let Some(parent) = current.field(PARENT_FIELD).await? else {
                break;
            };
            let parent = Jid::new(parent);
            if !visited.insert(parent.clone()) {
                return Err(HierarchyError::StructuralAnomaly(format!(
                    "parent chain of {} loops at {parent}",
                    self.jid
                )));
            }
            if visited.len() > max_depth + 1 {
                return Err(HierarchyError::StructuralAnomaly(format!(
                    "parent chain of {} is longer than {max_depth}",
                    self.jid
                )));
            }
            current = self.sibling(parent);
        }

        let root = current.jid.clone();
        let _ = self.root.set(root.clone());
        Ok(self.sibling(root))
    }

    /// Every node of the subtree, breadth first, this node first.
    pub async fn descendants(&self) -> Result<Vec<JobNode>> {
        self.ensure_exists().await?;
        let entries = self.backend().subtree(&self.jid, WalkMode::Strict).await?;
        Ok(entries
            .into_iter()
            .map(|entry| self.sibling(entry.jid))
            .collect())
    }

    /// Distinct childless nodes of the subtree; a leaf returns itself.
    pub async fn leaves(&self) -> Result<Vec<JobNode>> {
        self.ensure_exists().await?;
        let entries = self.backend().subtree(&self.jid, WalkMode::Strict).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.children.is_empty())
            .map(|entry| self.sibling(entry.jid))
            .collect())
    }

    /// Draw the edge `self -> child` in one batch.
    ///
    /// Sets the child's parent and appends it to the children list, with
    /// both expiries refreshed. Returns `false` when the edge already existed
    /// and the duplicate policy is `Ignore`.
    pub async fn add_child(&self, child: &JobNode) -> Result<bool> {
        if child.jid == self.jid {
            return Err(HierarchyError::StructuralAnomaly(format!(
                "job {} cannot be its own child",
                self.jid
            )));
        }

        let backend = self.backend();
        let children_key = backend.keys().children(&self.jid);
        if backend.config().duplicate_child_policy == DuplicateChildPolicy::Ignore {
            let listed = backend.store().lrange(&children_key).await?;
            if listed.iter().any(|jid| jid == child.jid.as_str()) {
                debug!(parent = %self.jid, child = %child.jid, "edge already drawn");
                return Ok(false);
            }
        }

        let child_key = backend.keys().job(&child.jid);
        let ttl = backend.config().ttl();
        backend
            .store()
            .atomic(vec![
                Command::HSet {
                    key: child_key.clone(),
                    fields: vec![(PARENT_FIELD.to_string(), self.jid.to_string())],
                },
                Command::Expire {
                    key: child_key,
                    ttl,
                },
                Command::RPush {
                    key: children_key.clone(),
                    value: child.jid.to_string(),
                },
                Command::Expire {
                    key: children_key,
                    ttl,
                },
            ])
            .await?;
        debug!(parent = %self.jid, child = %child.jid, "added child");
        Ok(true)
    }

    pub async fn workflow(&self) -> Result<Workflow> {
        Workflow::find(self).await
    }

    // ---- transitions ----

    pub async fn enqueue(&self) -> Result<Transition> {
        self.transition(JobStatus::Queued).await
    }

    pub async fn run(&self) -> Result<Transition> {
        self.transition(JobStatus::Running).await
    }

    pub async fn complete(&self) -> Result<Transition> {
        self.transition(JobStatus::Complete).await
    }

    pub async fn requeue(&self) -> Result<Transition> {
        self.transition(JobStatus::Requeued).await
    }

    /// Record a failure classified by the job-processing system.
    pub async fn fail(&self) -> Result<Transition> {
        self.transition(JobStatus::Failed).await
    }

    /// Write the status, then notify.
    ///
    /// `job.status_update` is always published. `workflow.status_update` is
    /// published when someone listens and the aggregate status changed.
    async fn transition(&self, status: JobStatus) -> Result<Transition> {
        let previous = self.status().await?;

        let tracks_workflow = self
            .tracker
            .bus()
            .has_subscribers(Topic::WorkflowStatusUpdate);
        let before = if tracks_workflow {
            self.aggregate().await
        } else {
            None
        };

        self.write_fields(vec![(STATUS_FIELD.to_string(), status.to_string())])
            .await?;
        debug!(jid = %self.jid, status = %status, previous = ?previous, "job status written");

        let bus = self.tracker.bus();
        let mut failed_deliveries = bus
            .publish(&Notification::JobStatusUpdate(JobStatusChange {
                jid: self.jid.clone(),
                status,
                previous,
            }))
            .await;

        let mut workflow = None;
        if let Some((root, before)) = before
            && let Some((_, after)) = self.aggregate().await
            && after != before
        {
            let change = WorkflowStatusChange {
                workflow: root,
                status: after,
                previous: Some(before),
            };
            failed_deliveries.extend(
                bus.publish(&Notification::WorkflowStatusUpdate(change.clone()))
                    .await,
            );
            workflow = Some(change);
        }

        Ok(Transition {
            jid: self.jid.clone(),
            status,
            previous,
            workflow,
            failed_deliveries,
        })
    }

    /// Root jid and aggregate status, or `None` (logged) if the tree can't
    /// be evaluated.
    async fn aggregate(&self) -> Option<(Jid, WorkflowStatus)> {
        let result = async {
            let workflow = Workflow::find(self).await?;
            let status = workflow.status().await?;
            Ok::<_, HierarchyError>((workflow.jid().clone(), status))
        }
        .await;
        match result {
            Ok(aggregate) => Some(aggregate),
            Err(error) => {
                warn!(jid = %self.jid, error = %error, "skipping workflow status update");
                None
            }
        }
    }

    // ---- status queries ----

    async fn has_status(&self, status: JobStatus) -> Result<bool> {
        Ok(self.status().await? == Some(status))
    }

    pub async fn is_enqueued(&self) -> Result<bool> {
        self.has_status(JobStatus::Queued).await
    }

    pub async fn is_running(&self) -> Result<bool> {
        self.has_status(JobStatus::Running).await
    }

    pub async fn is_complete(&self) -> Result<bool> {
        self.has_status(JobStatus::Complete).await
    }

    pub async fn is_requeued(&self) -> Result<bool> {
        self.has_status(JobStatus::Requeued).await
    }

    pub async fn is_failed(&self) -> Result<bool> {
        self.has_status(JobStatus::Failed).await
    }
}
