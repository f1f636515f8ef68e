//! Collections - 状態別の workflow 索引
//!
//! # 主要コンポーネント
//! - **StatusCollection**: 上限なし（running 用）
//! - **BoundedStatusCollection**: 保持期間・件数上限つき（complete / failed 用）
//! - **CollectionCursor**: 新しい順のページング
//! - **StatusCollections**: 3 カテゴリの束

pub mod bounded;
pub mod cursor;
pub mod status;

pub use self::bounded::BoundedStatusCollection;
pub use self::cursor::CollectionCursor;
pub use self::status::{StatusCollection, WorkflowCollection};

use crate::app::Backend;
use crate::domain::{HierarchyError, Jid, Result, StatusCategory};

/// The running, complete and failed indexes of one tracker.
#[derive(Clone)]
pub struct StatusCollections {
    running: StatusCollection,
    complete: BoundedStatusCollection,
    failed: BoundedStatusCollection,
}

impl StatusCollections {
    pub fn new(backend: Backend) -> Result<Self> {
        let bounded = |category: StatusCategory| -> Result<BoundedStatusCollection> {
            let retention = backend.config().retention(category).ok_or_else(|| {
                HierarchyError::InvalidConfig(format!("no retention for {category}"))
            })?;
            let inner = StatusCollection::new(backend.clone(), category);
            BoundedStatusCollection::new(inner, retention)
        };
        Ok(Self {
            complete: bounded(StatusCategory::Complete)?,
            failed: bounded(StatusCategory::Failed)?,
            running: StatusCollection::new(backend.clone(), StatusCategory::Running),
        })
    }

    pub fn running(&self) -> &StatusCollection {
        &self.running
    }

    pub fn complete(&self) -> &BoundedStatusCollection {
        &self.complete
    }

    pub fn failed(&self) -> &BoundedStatusCollection {
        &self.failed
    }

    pub fn get(&self, category: StatusCategory) -> &dyn WorkflowCollection {
        match category {
            StatusCategory::Running => &self.running,
            StatusCategory::Complete => &self.complete,
            StatusCategory::Failed => &self.failed,
        }
    }

    pub fn all(&self) -> [&dyn WorkflowCollection; 3] {
        StatusCategory::ALL.map(|category| self.get(category))
    }

    /// Move `workflow` into the collection of `category`, out of the others.
    pub async fn move_to(&self, category: StatusCategory, workflow: &Jid) -> Result<()> {
        self.get(category).move_from(workflow, &self.all()).await
    }

    /// First collection (running, complete, failed order) holding `workflow`.
    pub async fn locate(&self, workflow: &Jid) -> Result<Option<StatusCategory>> {
        for collection in self.all() {
            if collection.contains(workflow).await? {
                return Ok(Some(collection.category()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::HierarchyConfig;
    use crate::impls::InMemoryStore;
    use crate::ports::SystemClock;
    use std::sync::Arc;

    fn collections() -> StatusCollections {
        let backend = Backend::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            HierarchyConfig::default(),
        );
        StatusCollections::new(backend).unwrap()
    }

    #[tokio::test]
    async fn move_to_leaves_a_single_membership() {
        let collections = collections();
        let w = Jid::from("w1");

        collections.move_to(StatusCategory::Running, &w).await.unwrap();
        assert_eq!(
            collections.locate(&w).await.unwrap(),
            Some(StatusCategory::Running)
        );

        collections.move_to(StatusCategory::Failed, &w).await.unwrap();
        assert!(!collections.running().contains(&w).await.unwrap());
        assert!(!collections.complete().contains(&w).await.unwrap());
        assert!(collections.failed().contains(&w).await.unwrap());
    }

    #[tokio::test]
    async fn locate_unknown_workflow() {
        let collections = collections();
        assert_eq!(collections.locate(&Jid::from("nope")).await.unwrap(), None);
    }

    #[test]
    fn get_resolves_each_category() {
        let collections = collections();
        for category in StatusCategory::ALL {
            assert_eq!(collections.get(category).category(), category);
        }
    }
}
