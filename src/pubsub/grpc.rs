//! gRPC backend on the google-cloud-pubsub client, pointed at an emulator.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_cloud_gax::conn::{ConnectionOptions, Environment};
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::{Publisher, PublisherConfig};
use google_cloud_pubsub::subscription::SubscriptionConfig as PubsubSubscriptionConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pubsub::backend::{
    MessageHandler, PublisherSettings, PubsubBackend, Reply, TopicPublisher,
};
use crate::pubsub::types::{SubscriptionName, TopicName};
use crate::types::{Message, MessageId, ReceivedMessage, SubscriptionConfig};

/// gRPC connection settings.
#[derive(Debug, Clone)]
pub struct GrpcBackendConfig {
    /// Broker address, `host:port` or `http://host:port`.
    pub endpoint: String,
    /// Project the client is bound to.
    pub project_id: String,
    /// Timeout for establishing channels.
    pub connect_timeout: Duration,
}

impl Default for GrpcBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:8085".to_string(),
            project_id: "app-test-pub-sub".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Pub/Sub backend over plaintext gRPC.
///
/// Delivery, retries and stream management belong to the client library;
/// this type only translates between its types and the probe's.
pub struct GrpcBackend {
    client: Client,
}

impl GrpcBackend {
    /// Connect to the broker.
    pub async fn connect(config: &GrpcBackendConfig) -> Result<Self> {
        let host = emulator_host(&config.endpoint)?;

        let mut connection_option = ConnectionOptions::default();
        connection_option.connect_timeout = Some(config.connect_timeout);

        let client_config = ClientConfig {
            project_id: Some(config.project_id.clone()),
            environment: Environment::Emulator(host.clone()),
            connection_option,
            ..Default::default()
        };

        info!("Connecting to Pub/Sub broker at {}", host);
        let client = Client::new(client_config).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PubsubBackend for GrpcBackend {
    async fn create_topic(&self, topic: &TopicName) -> Result<()> {
        debug!("CreateTopic: {}", topic);
        self.client
            .topic(&topic.to_string())
            .create(None, None)
            .await?;
        Ok(())
    }

    async fn create_subscription(&self, config: &SubscriptionConfig) -> Result<()> {
        debug!("CreateSubscription: {} -> {}", config.name, config.topic);
        self.client
            .subscription(&config.name.to_string())
            .create(&config.topic.to_string(), pull_subscription_config(config), None)
            .await?;
        Ok(())
    }

    fn publisher(&self, topic: &TopicName, settings: &PublisherSettings) -> Box<dyn TopicPublisher> {
        let publisher = self
            .client
            .topic(&topic.to_string())
            .new_publisher(Some(publisher_config(settings)));
        Box::new(GrpcTopicPublisher {
            topic: topic.to_string(),
            inner: publisher,
        })
    }

    async fn receive(
        &self,
        subscription: &SubscriptionName,
        handler: MessageHandler,
        cancel: CancellationToken,
    ) -> Result<()> {
        let name = subscription.to_string();
        info!("StreamingPull opening on {}", name);

        self.client
            .subscription(&name)
            .receive(
                move |message, _ctx| {
                    let handler = handler.clone();
                    async move {
                        let received = received_from_pubsub(
                            message.ack_id(),
                            &message.message,
                            message.delivery_attempt().and_then(|n| i32::try_from(n).ok()),
                        );
                        let settled = match handler(received).await {
                            Reply::Ack => message.ack().await,
                            Reply::Nack => message.nack().await,
                        };
                        if let Err(status) = settled {
                            warn!("Failed to settle message {}: {}", message.message.message_id, status);
                        }
                    }
                },
                cancel,
                None,
            )
            .await?;

        debug!("StreamingPull on {} closed", name);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "grpc"
    }
}

/// The client library's publisher for one topic.
struct GrpcTopicPublisher {
    topic: String,
    inner: Publisher,
}

#[async_trait]
impl TopicPublisher for GrpcTopicPublisher {
    async fn publish(&self, message: Message) -> Result<MessageId> {
        let awaiter = self.inner.publish(message_to_pubsub(message)).await;
        let id = awaiter.get().await?;
        debug!("Published message {} to {}", id, self.topic);
        Ok(MessageId::from_string(id))
    }

    async fn shutdown(&mut self) {
        self.inner.shutdown().await;
        debug!("Publisher for {} shut down", self.topic);
    }
}

fn pull_subscription_config(config: &SubscriptionConfig) -> PubsubSubscriptionConfig {
    PubsubSubscriptionConfig {
        ack_deadline_seconds: duration_to_seconds(config.ack_deadline),
        ..Default::default()
    }
}

fn publisher_config(settings: &PublisherSettings) -> PublisherConfig {
    PublisherConfig {
        bundle_size: settings.max_batch_messages.max(1),
        flush_interval: settings.flush_interval,
        ..Default::default()
    }
}

fn message_to_pubsub(message: Message) -> PubsubMessage {
    PubsubMessage {
        data: message.data,
        attributes: message.attributes,
        ordering_key: message.ordering_key.unwrap_or_default(),
        ..Default::default()
    }
}

fn received_from_pubsub(
    ack_id: &str,
    message: &PubsubMessage,
    delivery_attempt: Option<i32>,
) -> ReceivedMessage {
    ReceivedMessage {
        ack_id: ack_id.to_string(),
        message_id: MessageId::from_string(message.message_id.clone()),
        publish_time: message
            .publish_time
            .as_ref()
            .and_then(|ts| timestamp_to_datetime(ts.seconds, ts.nanos)),
        delivery_attempt,
        message: Message {
            data: message.data.clone(),
            attributes: message.attributes.clone(),
            ordering_key: (!message.ordering_key.is_empty()).then(|| message.ordering_key.clone()),
        },
    }
}

fn timestamp_to_datetime(seconds: i64, nanos: i32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
}

fn duration_to_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

/// `host:port` as the client expects it for an emulator.
fn emulator_host(endpoint: &str) -> Result<String> {
    let host = endpoint
        .trim()
        .trim_start_matches("http://")
        .trim_end_matches('/');
    if host.is_empty() || host.contains(char::is_whitespace) || host.contains("://") {
        return Err(Error::Config(format!("Invalid endpoint: {:?}", endpoint)));
    }
    Ok(host.to_string())
}
