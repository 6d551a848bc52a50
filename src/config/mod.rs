//! Configuration system for pubsub-probe.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::payload::DEFAULT_SOURCE;
use crate::core::publisher::PublisherSettings;
use crate::core::receiver::ReceiverSettings;
use crate::error::Error;
use crate::pubsub::grpc::GrpcBackendConfig;
use crate::pubsub::{SubscriptionName, TopicName};
use crate::types::SubscriptionConfig;

/// Smallest ack deadline the broker accepts, in seconds.
pub const MIN_ACK_DEADLINE_SECS: u64 = 10;
/// Largest ack deadline the broker accepts, in seconds.
pub const MAX_ACK_DEADLINE_SECS: u64 = 600;

const RESOURCE_PREFIX: &str = "projects/";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Resource identifiers.
    pub resources: ResourceConfig,
    /// Publish step.
    pub publish: PublishConfig,
    /// Receive step.
    pub receive: ReceiveConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Backend type.
    pub backend: BackendKind,
    /// `host:port` of the broker.
    pub endpoint: String,
    /// Channel connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

/// Which backend the probe talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// gRPC broker or emulator.
    Grpc,
    /// In-process broker; nothing leaves the process.
    Memory,
}

impl BackendKind {
    /// Parse a backend name; anything but `memory` selects gRPC.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Grpc
        }
    }
}

/// Resource identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// GCP project ID.
    pub project_id: String,
    /// Topic ID.
    pub topic_id: String,
    /// Subscription ID.
    pub subscription_id: String,
    /// Subscription ack deadline in seconds.
    pub ack_deadline_secs: u64,
}

/// Publish step configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Value of the `source` attribute.
    pub source: String,
    /// Most messages per Publish RPC.
    pub max_batch_messages: usize,
    /// Flush a partial batch after this many milliseconds.
    pub flush_interval_ms: u64,
    /// Publisher shutdown grace period in seconds.
    pub shutdown_grace_secs: u64,
}

/// Receive step configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveConfig {
    /// Subscriber shutdown grace period in seconds.
    pub shutdown_grace_secs: u64,
    /// Stop waiting after this many seconds; `None` waits forever.
    pub wait_timeout_secs: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
    /// Log format (text or json).
    pub format: LogFormat,
}

/// Log format enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format.
    Text,
    /// JSON format.
    Json,
}

impl LogFormat {
    /// Parse a format name; anything but `json` selects text.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig {
                backend: BackendKind::Grpc,
                endpoint: "localhost:8085".to_string(),
                connect_timeout_secs: 10,
            },
            resources: ResourceConfig {
                project_id: "app-test-pub-sub".to_string(),
                topic_id: "app-test-pub-sub-topic".to_string(),
                subscription_id: "app-test-pub-sub-subscription".to_string(),
                ack_deadline_secs: 10,
            },
            publish: PublishConfig {
                source: DEFAULT_SOURCE.to_string(),
                max_batch_messages: 100,
                flush_interval_ms: 100,
                shutdown_grace_secs: 5,
            },
            receive: ReceiveConfig {
                shutdown_grace_secs: 5,
                wait_timeout_secs: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Text,
            },
        }
    }
}

impl ProbeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.broker.endpoint.trim().is_empty() {
            return Err(Error::Config("Broker endpoint must not be empty".to_string()));
        }

        self.topic()?;
        self.subscription()?;

        let ack = self.resources.ack_deadline_secs;
        if !(MIN_ACK_DEADLINE_SECS..=MAX_ACK_DEADLINE_SECS).contains(&ack) {
            return Err(Error::Config(format!(
                "Ack deadline must be {}-{} seconds, got {}",
                MIN_ACK_DEADLINE_SECS, MAX_ACK_DEADLINE_SECS, ack
            )));
        }

        if self.publish.max_batch_messages == 0 {
            return Err(Error::Config("Publish batch size must be at least 1".to_string()));
        }

        Ok(())
    }

    /// The configured topic. A fully qualified `topic_id` overrides the project.
    pub fn topic(&self) -> crate::Result<TopicName> {
        let id = &self.resources.topic_id;
        if id.starts_with(RESOURCE_PREFIX) {
            id.parse()
        } else {
            TopicName::new(&self.resources.project_id, id)
        }
    }

    /// The configured subscription. A fully qualified `subscription_id`
    /// overrides the project.
    pub fn subscription(&self) -> crate::Result<SubscriptionName> {
        let id = &self.resources.subscription_id;
        if id.starts_with(RESOURCE_PREFIX) {
            id.parse()
        } else {
            SubscriptionName::new(&self.resources.project_id, id)
        }
    }

    /// Pull subscription bound to the configured topic.
    pub fn subscription_config(&self) -> crate::Result<SubscriptionConfig> {
        Ok(SubscriptionConfig::pull(
            self.subscription()?,
            self.topic()?,
            Duration::from_secs(self.resources.ack_deadline_secs),
        ))
    }

    /// gRPC connection settings.
    pub fn grpc(&self) -> GrpcBackendConfig {
        GrpcBackendConfig {
            endpoint: self.broker.endpoint.clone(),
            project_id: self.resources.project_id.clone(),
            connect_timeout: Duration::from_secs(self.broker.connect_timeout_secs),
        }
    }

    /// Publisher settings.
    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            max_batch_messages: self.publish.max_batch_messages,
            flush_interval: Duration::from_millis(self.publish.flush_interval_ms),
        }
    }

    /// Publisher shutdown grace period.
    pub fn publish_grace(&self) -> Duration {
        Duration::from_secs(self.publish.shutdown_grace_secs)
    }

    /// Receiver settings.
    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            shutdown_grace: Duration::from_secs(self.receive.shutdown_grace_secs),
            wait_limit: self.receive.wait_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.broker.endpoint, "localhost:8085");
        assert_eq!(
            config.topic().unwrap().to_string(),
            "projects/app-test-pub-sub/topics/app-test-pub-sub-topic"
        );
        assert_eq!(
            config.subscription().unwrap().to_string(),
            "projects/app-test-pub-sub/subscriptions/app-test-pub-sub-subscription"
        );
        assert_eq!(config.publish.source, "csharp-emulator-test");
        assert_eq!(config.publish_grace(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_subscription_config_uses_ack_deadline() {
        let config = ProbeConfig::default();
        let sub = config.subscription_config().unwrap();
        assert_eq!(sub.ack_deadline, Duration::from_secs(10));
        assert_eq!(sub.topic, config.topic().unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ProbeConfig::default();
        config.resources.ack_deadline_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.resources.ack_deadline_secs = 601;
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.resources.topic_id = String::new();
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.broker.endpoint = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.publish.max_batch_messages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_receiver_settings_wait_limit() {
        let mut config = ProbeConfig::default();
        assert!(config.receiver_settings().wait_limit.is_none());
        config.receive.wait_timeout_secs = Some(30);
        assert_eq!(
            config.receiver_settings().wait_limit,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_fully_qualified_names() {
        let mut config = ProbeConfig::default();
        config.resources.topic_id = "projects/other/topics/t1".to_string();
        config.resources.subscription_id = "projects/other/subscriptions/s1".to_string();
        assert!(config.validate().is_ok());

        let topic = config.topic().unwrap();
        assert_eq!(topic.project(), "other");
        assert_eq!(topic.topic_id(), "t1");
        assert_eq!(config.subscription().unwrap().subscription_id(), "s1");

        config.resources.topic_id = "projects/other/subscriptions/s1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_publisher_settings_from_config() {
        let mut config = ProbeConfig::default();
        config.publish.max_batch_messages = 7;
        config.publish.flush_interval_ms = 25;
        let settings = config.publisher_settings();
        assert_eq!(settings.max_batch_messages, 7);
        assert_eq!(settings.flush_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(BackendKind::parse("MEMORY"), BackendKind::Memory);
        assert_eq!(BackendKind::parse("grpc"), BackendKind::Grpc);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }

    #[test]
    fn test_serializes_lowercase_enums() {
        let json = serde_json::to_value(ProbeConfig::default()).unwrap();
        assert_eq!(json["broker"]["backend"], "grpc");
        assert_eq!(json["logging"]["format"], "text");
    }
}
