//! Notify - 状態遷移通知のプロセス内配信
//!
//! # 主要コンポーネント
//! - **NotificationBus**: topic ごとの subscriber 登録と配信
//! - **CollectionSyncObserver**: workflow の状態に合わせて StatusCollection を移動

pub mod bus;
pub mod observer;

pub use self::bus::{DeliveryFailure, NotificationBus, Subscriber};
pub use self::observer::CollectionSyncObserver;
