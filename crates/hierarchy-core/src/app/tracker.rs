//! Tracker - ライブラリの入口
//!
//! Backend・NotificationBus・StatusCollections を束ね、JobNode / Workflow の
//! ハンドルを発行します。clone は安価（中身はすべて Arc 共有）。

use std::collections::BTreeMap;
use std::sync::Arc;

use super::backend::Backend;
use super::builder::TrackerBuilder;
use crate::collections::{StatusCollections, WorkflowCollection};
use crate::domain::{Jid, Result, StatusCategory};
use crate::notify::NotificationBus;
use crate::ports::JidGenerator;
use crate::tree::{JobNode, Workflow, WorkflowCursor};

#[derive(Clone)]
pub struct Tracker {
    backend: Backend,
    bus: Arc<NotificationBus>,
    collections: StatusCollections,
    ids: Arc<dyn JidGenerator>,
}

impl Tracker {
    pub(crate) fn new(
        backend: Backend,
        bus: NotificationBus,
        collections: StatusCollections,
        ids: Arc<dyn JidGenerator>,
    ) -> Self {
        Self {
            backend,
            bus: Arc::new(bus),
            collections,
            ids,
        }
    }

    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn collections(&self) -> &StatusCollections {
        &self.collections
    }

    pub fn collection(&self, category: StatusCategory) -> &dyn WorkflowCollection {
        self.collections.get(category)
    }

    /// Record a newly submitted job (status queued).
    pub async fn create_job(
        &self,
        jid: impl Into<Jid>,
        metadata: BTreeMap<String, String>,
    ) -> Result<JobNode> {
        JobNode::create(self, jid, metadata).await
    }

    /// Like [`create_job`](Self::create_job) with a generated jid.
    pub async fn submit(&self, metadata: BTreeMap<String, String>) -> Result<JobNode> {
        self.create_job(self.ids.generate(), metadata).await
    }

    /// Handle for `jid`; no store access.
    pub fn job(&self, jid: impl Into<Jid>) -> JobNode {
        JobNode::find(self, jid)
    }

    /// The workflow `jid` belongs to.
    pub async fn workflow(&self, jid: impl Into<Jid>) -> Result<Workflow> {
        Workflow::find(&self.job(jid)).await
    }

    /// Newest-first workflows of one category.
    pub fn workflows(&self, category: StatusCategory) -> WorkflowCursor {
        WorkflowCursor::new(self.collection(category).each(), self.clone())
    }
}
