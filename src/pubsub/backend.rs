//! The broker seam: everything the probe needs from a Pub/Sub service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::pubsub::types::{SubscriptionName, TopicName};
use crate::types::{Message, MessageId, ReceivedMessage, SubscriptionConfig};
use crate::Result;

/// What the handler wants done with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Processed; remove from redelivery.
    Ack,
    /// Not processed; redeliver.
    Nack,
}

/// Future returned by a [`MessageHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Reply> + Send + 'static>>;

/// Callback invoked once per delivered message.
pub type MessageHandler = Arc<dyn Fn(ReceivedMessage) -> HandlerFuture + Send + Sync>;

/// Publisher tuning passed through to the backend.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    /// Most messages bundled into one Publish RPC.
    pub max_batch_messages: usize,
    /// How long a partial bundle may wait before it is flushed.
    pub flush_interval: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            max_batch_messages: 100,
            flush_interval: Duration::from_millis(100),
        }
    }
}

/// Operations the probe issues against a broker.
///
/// Create calls report an existing resource as [`crate::Error::AlreadyExists`].
#[async_trait]
pub trait PubsubBackend: Send + Sync {
    /// Create a topic.
    async fn create_topic(&self, topic: &TopicName) -> Result<()>;

    /// Create a subscription bound to an existing topic.
    async fn create_subscription(&self, config: &SubscriptionConfig) -> Result<()>;

    /// Open a publisher for one topic. It holds resources until shut down.
    fn publisher(&self, topic: &TopicName, settings: &PublisherSettings) -> Box<dyn TopicPublisher>;

    /// Stream from `subscription`, settling each message with the handler's
    /// reply, until `cancel` fires or the stream fails.
    async fn receive(
        &self,
        subscription: &SubscriptionName,
        handler: MessageHandler,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

/// A publisher bound to one topic.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Publish one message and wait for the broker's message ID.
    async fn publish(&self, message: Message) -> Result<MessageId>;

    /// Flush pending messages and release the publisher's workers.
    async fn shutdown(&mut self);
}
