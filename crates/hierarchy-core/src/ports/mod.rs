//! Ports - 抽象化レイヤー
//!
//! 外部システム（key-value store、時計、ID 生成）へのインターフェースを
//! trait として定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{JidGenerator, UlidGenerator};
pub use self::store::{Command, KeyValueStore, Reply, StoreError, StoreResult};
