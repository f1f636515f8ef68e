//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発・テスト用の key-value store
//!
//! # 本番用実装
//! 本番用の store（ネットワーク越しの key-value service）は別クレートで
//! `KeyValueStore` を実装して差し込みます。

pub mod memory_store;

pub use self::memory_store::InMemoryStore;
