//! Common data types for pubsub-probe.

pub mod validation;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pubsub::types::{SubscriptionName, TopicName};

/// Broker-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a message ID from a string.
    pub fn from_string(s: String) -> Self {
        MessageId(s)
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message attributes.
pub type MessageAttributes = HashMap<String, String>;

/// An outgoing message: opaque bytes plus string attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message payload.
    pub data: Vec<u8>,
    /// Message attributes.
    pub attributes: MessageAttributes,
    /// Ordering key, if any.
    pub ordering_key: Option<String>,
}

impl Message {
    /// Create a message carrying `data` and no attributes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Add an attribute, replacing any previous value for `key`.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn data_as_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Attributes rendered as `key=value` pairs, sorted by key.
    pub fn format_attributes(&self) -> String {
        let mut pairs: Vec<_> = self.attributes.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A message delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Handle used to acknowledge this delivery.
    pub ack_id: String,
    /// Broker-assigned message ID.
    pub message_id: MessageId,
    /// The message itself.
    pub message: Message,
    /// When the broker accepted the message.
    pub publish_time: Option<DateTime<Utc>>,
    /// Delivery attempt, when the subscription tracks it.
    pub delivery_attempt: Option<i32>,
}

/// Settings for creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Subscription name.
    pub name: SubscriptionName,
    /// Topic the subscription is bound to.
    pub topic: TopicName,
    /// Acknowledgment deadline.
    pub ack_deadline: Duration,
}

impl SubscriptionConfig {
    /// A pull subscription with the given ack deadline.
    pub fn pull(name: SubscriptionName, topic: TopicName, ack_deadline: Duration) -> Self {
        Self {
            name,
            topic,
            ack_deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_attributes_sorted() {
        let message = Message::new("hello")
            .with_attribute("source", "csharp-emulator-test")
            .with_attribute("kind", "demo");

        assert_eq!(message.format_attributes(), "kind=demo, source=csharp-emulator-test");
    }

    #[test]
    fn test_format_attributes_empty() {
        assert_eq!(Message::new("x").format_attributes(), "");
    }

    #[test]
    fn test_with_attribute_replaces() {
        let message = Message::new("x")
            .with_attribute("source", "a")
            .with_attribute("source", "b");
        assert_eq!(message.attributes.len(), 1);
        assert_eq!(message.attributes["source"], "b");
    }

    #[test]
    fn test_data_as_text_lossy() {
        let message = Message::new(vec![b'h', b'i', 0xff]);
        assert_eq!(message.data_as_text(), "hi\u{fffd}");
    }
}
