//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて Tracker を組み立てます。
//!
//! # 主要コンポーネント
//! - **TrackerBuilder**: Tracker の構築とワイヤリング
//! - **Tracker**: JobNode / Workflow / コレクションの入口
//! - **Backend**: store / clock / config の束
//! - **HierarchyConfig**: 設定値

pub mod backend;
pub mod builder;
pub mod config;
pub mod keys;
pub mod tracker;

// 主要な型を再エクスポート
pub use self::backend::Backend;
pub(crate) use self::backend::WalkMode;
pub use self::builder::{BuildError, TrackerBuilder};
pub use self::config::{DuplicateChildPolicy, HierarchyConfig, Retention};
pub use self::keys::Keys;
pub use self::tracker::Tracker;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{HierarchyConfig, Tracker, TrackerBuilder};
    use crate::impls::InMemoryStore;
    use crate::ports::FixedClock;

    pub struct TestTracker {
        pub tracker: Tracker,
        pub store: InMemoryStore,
        pub clock: Arc<FixedClock>,
    }

    pub fn test_tracker() -> TestTracker {
        test_tracker_with(HierarchyConfig::default())
    }

    pub fn test_tracker_with(config: HierarchyConfig) -> TestTracker {
        test_tracker_from(TrackerBuilder::new().config(config))
    }

    /// Finish `builder` with an in-memory store and a fixed clock.
    pub fn test_tracker_from(builder: TrackerBuilder) -> TestTracker {
        let store = InMemoryStore::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let tracker = builder
            .store(Arc::new(store.clone()))
            .clock(clock.clone())
            .build()
            .unwrap();
        TestTracker {
            tracker,
            store,
            clock,
        }
    }
}
