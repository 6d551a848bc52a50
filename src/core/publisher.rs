//! Publish step with a bounded shutdown.
//!
//! Bundling and retries happen inside the backend's publisher. This wrapper
//! insists on a usable message ID and gives `shutdown` a grace period.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pubsub::{PubsubBackend, TopicName, TopicPublisher};
use crate::types::{Message, MessageId};

pub use crate::pubsub::PublisherSettings;

/// Publishes messages to one topic.
pub struct Publisher {
    topic: TopicName,
    inner: Box<dyn TopicPublisher>,
}

impl Publisher {
    /// Start a publisher for `topic`.
    pub fn start(backend: &dyn PubsubBackend, topic: TopicName, settings: &PublisherSettings) -> Self {
        let inner = backend.publisher(&topic, settings);
        debug!("Publisher started for {} on {}", topic, backend.name());
        Self { topic, inner }
    }

    /// Topic this publisher sends to.
    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Publish one message and wait for the broker's message ID.
    ///
    /// A successful result always carries a non-empty ID.
    pub async fn publish(&self, message: Message) -> Result<MessageId> {
        let id = self.inner.publish(message).await?;
        if id.as_str().is_empty() {
            return Err(Error::MissingMessageId(self.topic.to_string()));
        }
        Ok(id)
    }

    /// Flush and release the publisher, waiting at most `grace`.
    ///
    /// Work still in flight when the grace period runs out is dropped.
    pub async fn shutdown(mut self, grace: Duration) -> Result<()> {
        info!("Shutting down publisher for {} (grace {:?})", self.topic, grace);
        match tokio::time::timeout(grace, self.inner.shutdown()).await {
            Ok(()) => {
                debug!("Publisher for {} stopped", self.topic);
                Ok(())
            }
            Err(_) => {
                warn!("Publisher for {} did not flush within {:?}", self.topic, grace);
                Err(Error::ShutdownTimeout(grace))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::pubsub::memory::InMemoryBackend;

    fn topic() -> TopicName {
        TopicName::new("local-project", "t1").unwrap()
    }

    /// Publisher that answers with a fixed ID and never finishes shutting down
    struct StuckPublisher {
        id: &'static str,
    }

    #[async_trait]
    impl TopicPublisher for StuckPublisher {
        async fn publish(&self, _message: Message) -> Result<MessageId> {
            Ok(MessageId::from_string(self.id.to_string()))
        }

        async fn shutdown(&mut self) {
            std::future::pending::<()>().await;
        }
    }

    fn stuck(id: &'static str) -> Publisher {
        Publisher {
            topic: topic(),
            inner: Box::new(StuckPublisher { id }),
        }
    }

    #[tokio::test]
    async fn test_publish_returns_id() {
        let backend = InMemoryBackend::new();
        backend.create_topic(&topic()).await.unwrap();

        let publisher = Publisher::start(&backend, topic(), &PublisherSettings::default());
        let id = publisher.publish(Message::new("hello")).await.unwrap();
        assert!(!id.as_str().is_empty());
        publisher.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_to_missing_topic_errors() {
        let backend = InMemoryBackend::new();
        let publisher = Publisher::start(&backend, topic(), &PublisherSettings::default());

        let err = publisher.publish(Message::new("hello")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        publisher.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_id_is_an_error() {
        let publisher = stuck("");
        let err = publisher.publish(Message::new("hello")).await.unwrap_err();
        assert!(matches!(err, Error::MissingMessageId(_)));
    }

    #[tokio::test]
    async fn test_shutdown_grace_expires() {
        let publisher = stuck("7");
        assert_eq!(publisher.publish(Message::new("hello")).await.unwrap().as_str(), "7");

        let err = publisher.shutdown(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::ShutdownTimeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_concurrent_publishes_get_distinct_ids() {
        let backend = InMemoryBackend::new();
        backend.create_topic(&topic()).await.unwrap();
        let publisher = Arc::new(Publisher::start(&backend, topic(), &PublisherSettings::default()));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let publisher = publisher.clone();
                tokio::spawn(async move { publisher.publish(Message::new(format!("m{i}"))).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids.dedup();
        assert_eq!(ids.len(), 10);

        let publisher = Arc::try_unwrap(publisher).ok().expect("no other owners");
        publisher.shutdown(Duration::from_secs(5)).await.unwrap();
    }
}
