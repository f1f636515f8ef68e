//! TrackerBuilder - Tracker の構築とワイヤリング
//!
//! # 方針
//! - Builder パターン
//! - 起動時検証（Fail-fast 設計）: 設定不備は build() で BuildError
//! - NotificationBus は構築中だけ mutable、build() 後は Arc で共有

use std::sync::Arc;

use super::backend::Backend;
use super::config::HierarchyConfig;
use super::tracker::Tracker;
use crate::collections::StatusCollections;
use crate::domain::Topic;
use crate::notify::{CollectionSyncObserver, NotificationBus, Subscriber};
use crate::ports::{Clock, JidGenerator, KeyValueStore, SystemClock, UlidGenerator};

/// TrackerBuilder は Tracker を構築
///
/// # 使用例
/// ```ignore
/// let tracker = TrackerBuilder::new()
///     .store(Arc::new(InMemoryStore::new()))
///     .with_collection_sync()
///     .build()?;
/// ```
pub struct TrackerBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn JidGenerator>>,
    config: HierarchyConfig,
    bus: NotificationBus,
    collection_sync: bool,
}

/// BuildError は Tracker 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No key-value store configured. Call store() before build().")]
    MissingStore,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            clock: Arc::new(SystemClock),
            ids: None,
            config: HierarchyConfig::default(),
            bus: NotificationBus::new(),
            collection_sync: false,
        }
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to ULIDs from the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn JidGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: HierarchyConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscriber を登録（登録順に配信）
    pub fn subscribe(mut self, topic: Topic, subscriber: Arc<dyn Subscriber>) -> Self {
        self.bus.subscribe(topic, subscriber);
        self
    }

    /// Register a [`CollectionSyncObserver`] over this tracker's collections.
    pub fn with_collection_sync(mut self) -> Self {
        self.collection_sync = true;
        self
    }

    /// # 検証
    /// - store が設定されているか
    /// - config.validate()
    pub fn build(self) -> Result<Tracker, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        self.config
            .validate()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;

        let backend = Backend::new(store, Arc::clone(&self.clock), self.config);
        let collections = StatusCollections::new(backend.clone())
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;

        let mut bus = self.bus;
        if self.collection_sync {
            CollectionSyncObserver::new(collections.clone()).register(&mut bus);
        }

        let ids: Arc<dyn JidGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(self.clock)),
        };
        Ok(Tracker::new(backend, bus, collections, ids))
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
