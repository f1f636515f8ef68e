//! hierarchy-core
//!
//! Job hierarchy and workflow tracking over a shared key-value store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, record, events, errors）
//! - **ports**: 抽象化レイヤー（KeyValueStore, Clock, JidGenerator）
//! - **impls**: 実装（InMemoryStore など開発・テスト用）
//! - **tree**: JobNode / Workflow（木の走査・状態遷移・集約）
//! - **collections**: 状態別の workflow 索引（StatusCollection, BoundedStatusCollection）
//! - **notify**: NotificationBus と CollectionSyncObserver
//! - **app**: 設定・Tracker・TrackerBuilder
//!
//! 木はプロセス内に保持しません。読み取りはすべて store から再構成します。

pub mod app;
pub mod collections;
pub mod domain;
pub mod impls;
pub mod notify;
pub mod ports;
pub mod tree;

pub use app::{HierarchyConfig, Tracker, TrackerBuilder};
pub use domain::{HierarchyError, Jid, JobStatus, Result, StatusCategory, WorkflowStatus};
pub use tree::{JobNode, Workflow};
