//! NotificationBus - プロセス内 publish/subscribe
//!
//! # 設計
//! - 構築中は mutable（subscribe）、実行中は immutable（Arc で共有）
//! - ロック不要（HandlerRegistry と同じ方針）
//! - 配信は同期的・購読順・プロセス内のみ（メッセージブローカーではない）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{HierarchyError, Notification, Result, Topic};

/// A handler for notifications on one or more topics.
///
/// Delivery is at-least-once; implementations must be idempotent.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used in delivery failure reports.
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// A subscriber returned an error.
///
/// The state change that triggered the notification is already committed.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub subscriber: String,
    pub topic: Topic,
    pub error: HierarchyError,
}

/// Registry of subscribers (topic -> subscribers in subscription order).
#[derive(Default)]
pub struct NotificationBus {
    subscribers: HashMap<Topic, Vec<Arc<dyn Subscriber>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topic: Topic, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.entry(topic).or_default().push(subscriber);
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers.get(&topic).map_or(0, Vec::len)
    }

    pub fn has_subscribers(&self, topic: Topic) -> bool {
        self.subscriber_count(topic) > 0
    }

    /// Deliver to every subscriber of the notification's topic, in order.
    ///
    /// A failing subscriber does not stop delivery to the rest; failures are
    /// logged and returned.
    pub async fn publish(&self, notification: &Notification) -> Vec<DeliveryFailure> {
        let topic = notification.topic();
        let Some(subscribers) = self.subscribers.get(&topic) else {
            return Vec::new();
        };

        let mut failures = Vec::new();
        for subscriber in subscribers {
            if let Err(error) = subscriber.notify(notification).await {
                warn!(
                    topic = %topic,
                    subscriber = subscriber.name(),
                    error = %error,
                    "notification delivery failed"
                );
                failures.push(DeliveryFailure {
                    subscriber: subscriber.name().to_string(),
                    topic,
                    error,
                });
            }
        }
        failures
    }
}
