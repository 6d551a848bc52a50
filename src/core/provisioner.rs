//! Ensures the topic and subscription exist before publishing.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::pubsub::{PubsubBackend, TopicName};
use crate::types::SubscriptionConfig;

/// Result of one provisioning attempt.
///
/// Provisioning never fails the run: a conflict counts as success and any
/// other error is reported here and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The resource was created by this call.
    Created,
    /// The broker already had the resource.
    AlreadyExists,
    /// Creation failed for another reason.
    Failed(String),
}

impl ProvisionOutcome {
    /// True for `Created` and `AlreadyExists`.
    pub fn is_ready(&self) -> bool {
        !matches!(self, ProvisionOutcome::Failed(_))
    }
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionOutcome::Created => write!(f, "created"),
            ProvisionOutcome::AlreadyExists => write!(f, "already exists"),
            ProvisionOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Creates topics and subscriptions, tolerating ones that already exist.
pub struct Provisioner {
    backend: Arc<dyn PubsubBackend>,
}

impl Provisioner {
    /// Create a provisioner over a backend.
    pub fn new(backend: Arc<dyn PubsubBackend>) -> Self {
        Self { backend }
    }

    /// Create `topic` unless it exists.
    pub async fn ensure_topic(&self, topic: &TopicName) -> ProvisionOutcome {
        let outcome = match self.backend.create_topic(topic).await {
            Ok(()) => ProvisionOutcome::Created,
            Err(e) if e.is_conflict() => ProvisionOutcome::AlreadyExists,
            Err(e) => ProvisionOutcome::Failed(e.to_string()),
        };

        match &outcome {
            ProvisionOutcome::Failed(e) => warn!(topic = %topic, "Failed to create topic: {}", e),
            outcome => info!(topic = %topic, "Topic {}", outcome),
        }
        outcome
    }

    /// Create the subscription described by `config` unless it exists.
    pub async fn ensure_subscription(&self, config: &SubscriptionConfig) -> ProvisionOutcome {
        let outcome = match self.backend.create_subscription(config).await {
            Ok(()) => ProvisionOutcome::Created,
            Err(e) if e.is_conflict() => ProvisionOutcome::AlreadyExists,
            Err(e) => ProvisionOutcome::Failed(e.to_string()),
        };

        match &outcome {
            ProvisionOutcome::Failed(e) => warn!(
                subscription = %config.name,
                topic = %config.topic,
                "Failed to create subscription: {}",
                e
            ),
            outcome => info!(
                subscription = %config.name,
                topic = %config.topic,
                ack_deadline_secs = config.ack_deadline.as_secs(),
                "Subscription {}",
                outcome
            ),
        }
        outcome
    }
}
