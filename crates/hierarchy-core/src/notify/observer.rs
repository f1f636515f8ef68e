//! CollectionSyncObserver - workflow の状態変化に合わせて索引を移動

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::bus::{NotificationBus, Subscriber};
use crate::collections::StatusCollections;
use crate::domain::{Notification, Result, Topic};

/// Keeps collection membership in step with workflow status.
///
/// Idempotent: a redundant notification re-adds the workflow to the
/// collection it is already in (refreshing its score).
pub struct CollectionSyncObserver {
    collections: StatusCollections,
}

impl CollectionSyncObserver {
    pub fn new(collections: StatusCollections) -> Self {
        Self { collections }
    }

    /// Subscribe to `workflow.status_update`.
    pub fn register(self, bus: &mut NotificationBus) {
        bus.subscribe(Topic::WorkflowStatusUpdate, Arc::new(self));
    }
}

#[async_trait]
impl Subscriber for CollectionSyncObserver {
    fn name(&self) -> &str {
        "collection_sync"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let Notification::WorkflowStatusUpdate(change) = notification else {
            return Ok(());
        };
        let category = change.status.category();
        self.collections.move_to(category, &change.workflow).await?;
        debug!(
            workflow = %change.workflow,
            status = %change.status,
            collection = %category,
            "synced workflow collection"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Backend, HierarchyConfig};
    use crate::collections::WorkflowCollection;
    use crate::domain::{Jid, WorkflowStatus, WorkflowStatusChange};
    use crate::impls::InMemoryStore;
    use crate::ports::SystemClock;

    fn collections() -> StatusCollections {
        StatusCollections::new(Backend::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            HierarchyConfig::default(),
        ))
        .unwrap()
    }

    fn update(workflow: &str, status: WorkflowStatus) -> Notification {
        Notification::WorkflowStatusUpdate(WorkflowStatusChange {
            workflow: Jid::from(workflow),
            status,
            previous: None,
        })
    }

    #[tokio::test]
    async fn moves_workflow_on_status_update() {
        let collections = collections();
        let mut bus = NotificationBus::new();
        CollectionSyncObserver::new(collections.clone()).register(&mut bus);
        assert!(bus.has_subscribers(Topic::WorkflowStatusUpdate));

        let w = Jid::from("w1");
        collections.running().add(&w).await.unwrap();

        let failures = bus.publish(&update("w1", WorkflowStatus::Failed)).await;
        assert!(failures.is_empty());
        assert!(!collections.running().contains(&w).await.unwrap());
        assert!(collections.failed().contains(&w).await.unwrap());

        // redundant delivery
        bus.publish(&update("w1", WorkflowStatus::Failed)).await;
        assert!(collections.failed().contains(&w).await.unwrap());
        assert_eq!(collections.failed().size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn queued_workflows_are_indexed_as_running() {
        let collections = collections();
        let observer = CollectionSyncObserver::new(collections.clone());

        observer
            .notify(&update("w1", WorkflowStatus::Queued))
            .await
            .unwrap();
        assert!(collections.running().contains(&Jid::from("w1")).await.unwrap());
    }
}
