//! In-process broker used for dry runs and tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::pubsub::backend::{
    MessageHandler, PublisherSettings, PubsubBackend, Reply, TopicPublisher,
};
use crate::pubsub::types::{SubscriptionName, TopicName};
use crate::types::{Message, MessageId, ReceivedMessage, SubscriptionConfig};
use crate::{Error, Result};

/// In-memory Pub/Sub backend.
///
/// Clones share state, so a clone handed to a publisher and one handed to a
/// subscriber see the same topics.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<InMemoryBackendInner>,
}

#[derive(Default)]
struct InMemoryBackendInner {
    /// Fully qualified topic names.
    topics: RwLock<HashSet<String>>,
    /// Subscriptions keyed by fully qualified name.
    subscriptions: RwLock<HashMap<String, SubscriptionData>>,
    /// Source of message IDs.
    next_message_id: AtomicU64,
}

struct SubscriptionData {
    /// Creation settings.
    config: SubscriptionConfig,
    /// Messages waiting for delivery.
    pending: VecDeque<StoredMessage>,
    /// Delivered but not yet settled, keyed by ack ID.
    outstanding: HashMap<String, StoredMessage>,
    /// Acknowledged message IDs, in ack order.
    acknowledged: Vec<MessageId>,
    /// Wakes receivers waiting on `pending`.
    notify: Arc<Notify>,
}

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    message: Message,
    publish_time: chrono::DateTime<Utc>,
    delivery_attempt: i32,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a topic exists.
    pub async fn has_topic(&self, topic: &TopicName) -> bool {
        self.inner.topics.read().await.contains(&topic.to_string())
    }

    /// Settings a subscription was created with.
    pub async fn subscription_config(&self, name: &SubscriptionName) -> Option<SubscriptionConfig> {
        self.inner
            .subscriptions
            .read()
            .await
            .get(&name.to_string())
            .map(|s| s.config.clone())
    }

    /// Messages acknowledged on a subscription, in ack order.
    pub async fn acknowledged(&self, name: &SubscriptionName) -> Vec<MessageId> {
        self.inner
            .subscriptions
            .read()
            .await
            .get(&name.to_string())
            .map(|s| s.acknowledged.clone())
            .unwrap_or_default()
    }

    /// Messages waiting for delivery on a subscription.
    pub async fn pending_count(&self, name: &SubscriptionName) -> usize {
        self.inner
            .subscriptions
            .read()
            .await
            .get(&name.to_string())
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    /// Store messages on every subscription of `topic`.
    ///
    /// All messages of one call reach a receiver as a single delivery batch.
    pub async fn publish(&self, topic: &TopicName, messages: Vec<Message>) -> Result<Vec<MessageId>> {
        if !self.has_topic(topic).await {
            return Err(Error::NotFound(format!("Topic not found: {}", topic)));
        }

        let publish_time = Utc::now();
        let stored: Vec<StoredMessage> = messages
            .into_iter()
            .map(|message| StoredMessage {
                message_id: self.next_message_id(),
                message,
                publish_time,
                delivery_attempt: 0,
            })
            .collect();

        let mut subscriptions = self.inner.subscriptions.write().await;
        for sub in subscriptions
            .values_mut()
            .filter(|s| s.config.topic == *topic)
        {
            sub.pending.extend(stored.iter().cloned());
            sub.notify.notify_one();
        }

        debug!("Published {} messages to {}", stored.len(), topic);
        Ok(stored.into_iter().map(|s| s.message_id).collect())
    }

    fn next_message_id(&self) -> MessageId {
        let id = self.inner.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        MessageId::from_string(id.to_string())
    }

    async fn notifier(&self, key: &str) -> Result<Arc<Notify>> {
        self.inner
            .subscriptions
            .read()
            .await
            .get(key)
            .map(|s| s.notify.clone())
            .ok_or_else(|| Error::NotFound(format!("Subscription not found: {}", key)))
    }

    /// Move everything pending to outstanding and hand it out.
    async fn deliver_pending(&self, key: &str) -> Result<Vec<ReceivedMessage>> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let data = subscriptions
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("Subscription not found: {}", key)))?;

        let mut batch = Vec::with_capacity(data.pending.len());
        while let Some(mut stored) = data.pending.pop_front() {
            stored.delivery_attempt += 1;
            let ack_id = Uuid::new_v4().to_string();
            batch.push(ReceivedMessage {
                ack_id: ack_id.clone(),
                message_id: stored.message_id.clone(),
                message: stored.message.clone(),
                publish_time: Some(stored.publish_time),
                delivery_attempt: Some(stored.delivery_attempt),
            });
            data.outstanding.insert(ack_id, stored);
        }
        Ok(batch)
    }

    async fn settle(&self, key: &str, ack_id: &str, reply: Reply) -> Result<()> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let data = subscriptions
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("Subscription not found: {}", key)))?;

        if let Some(stored) = data.outstanding.remove(ack_id) {
            match reply {
                Reply::Ack => data.acknowledged.push(stored.message_id),
                Reply::Nack => data.pending.push_front(stored),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PubsubBackend for InMemoryBackend {
    async fn create_topic(&self, topic: &TopicName) -> Result<()> {
        let mut topics = self.inner.topics.write().await;
        if !topics.insert(topic.to_string()) {
            return Err(Error::AlreadyExists(format!("Topic already exists: {}", topic)));
        }
        debug!("Created topic {}", topic);
        Ok(())
    }

    async fn create_subscription(&self, config: &SubscriptionConfig) -> Result<()> {
        if !self.has_topic(&config.topic).await {
            return Err(Error::NotFound(format!("Topic not found: {}", config.topic)));
        }

        let mut subscriptions = self.inner.subscriptions.write().await;
        let key = config.name.to_string();
        if subscriptions.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "Subscription already exists: {}",
                config.name
            )));
        }

        subscriptions.insert(
            key,
            SubscriptionData {
                config: config.clone(),
                pending: VecDeque::new(),
                outstanding: HashMap::new(),
                acknowledged: Vec::new(),
                notify: Arc::new(Notify::new()),
            },
        );
        debug!("Created subscription {} on {}", config.name, config.topic);
        Ok(())
    }

    fn publisher(&self, topic: &TopicName, _settings: &PublisherSettings) -> Box<dyn TopicPublisher> {
        Box::new(InMemoryTopicPublisher {
            backend: self.clone(),
            topic: topic.clone(),
        })
    }

    async fn receive(
        &self,
        subscription: &SubscriptionName,
        handler: MessageHandler,
        cancel: CancellationToken,
    ) -> Result<()> {
        let key = subscription.to_string();
        let notify = self.notifier(&key).await?;
        debug!("Receiving on {}", subscription);

        loop {
            let batch = self.deliver_pending(&key).await?;
            if batch.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = notify.notified() => continue,
                }
            }

            for message in batch {
                let ack_id = message.ack_id.clone();
                // Deliveries still buffered after cancellation go back unhandled
                let reply = if cancel.is_cancelled() {
                    Reply::Nack
                } else {
                    handler(message).await
                };
                self.settle(&key, &ack_id, reply).await?;
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        debug!("Stopped receiving on {}", subscription);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct InMemoryTopicPublisher {
    backend: InMemoryBackend,
    topic: TopicName,
}

#[async_trait]
impl TopicPublisher for InMemoryTopicPublisher {
    async fn publish(&self, message: Message) -> Result<MessageId> {
        let ids = self.backend.publish(&self.topic, vec![message]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::MissingMessageId(self.topic.to_string()))
    }

    async fn shutdown(&mut self) {
        debug!("In-memory publisher for {} released", self.topic);
    }
}
