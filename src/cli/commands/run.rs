// Probe steps and the `run` command
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use crate::cli::output::*;
use crate::config::ProbeConfig;
use crate::core::payload::Payload;
use crate::core::provisioner::{ProvisionOutcome, Provisioner};
use crate::core::publisher::Publisher;
use crate::core::receiver::{self, ReceiveReport, WaitOutcome};
use crate::pubsub::PubsubBackend;
use crate::types::MessageId;

/// One line of the run summary
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct StepSummary {
    /// Step name
    pub step: String,
    /// Resource the step acted on
    pub resource: String,
    /// What happened
    pub result: String,
}

impl StepSummary {
    fn new(step: &str, resource: impl ToString, result: impl ToString) -> Self {
        Self {
            step: step.to_string(),
            resource: resource.to_string(),
            result: result.to_string(),
        }
    }
}

/// Ensure the topic and subscription exist. Never fails.
pub async fn provision(
    config: &ProbeConfig,
    backend: Arc<dyn PubsubBackend>,
) -> Result<Vec<StepSummary>> {
    let topic = config.topic()?;
    let subscription = config.subscription_config()?;
    let provisioner = Provisioner::new(backend);

    let topic_outcome = provisioner.ensure_topic(&topic).await;
    report_outcome("Topic", topic.topic_id(), &topic_outcome);

    let sub_outcome = provisioner.ensure_subscription(&subscription).await;
    report_outcome("Subscription", subscription.name.subscription_id(), &sub_outcome);

    Ok(vec![
        StepSummary::new("create topic", &topic, &topic_outcome),
        StepSummary::new("create subscription", &subscription.name, &sub_outcome),
    ])
}

fn report_outcome(kind: &str, id: &str, outcome: &ProvisionOutcome) {
    match outcome {
        ProvisionOutcome::Created => print_success(&format!("{} {} created.", kind, id)),
        ProvisionOutcome::AlreadyExists => print_info(&format!("{} {} already exists.", kind, id)),
        ProvisionOutcome::Failed(e) => print_error(&format!("Error creating {} {}: {}", kind.to_lowercase(), id, e)),
    }
}

/// Publish one payload and release the publisher.
///
/// The publisher is shut down on every path before the publish result is
/// returned.
pub async fn publish(
    config: &ProbeConfig,
    backend: Arc<dyn PubsubBackend>,
    payload: Payload,
) -> Result<MessageId> {
    let topic = config.topic()?;
    let message = payload
        .into_message(&config.publish.source)
        .context("Failed to build message")?;

    print_info("Publishing message...");
    let publisher = Publisher::start(backend.as_ref(), topic.clone(), &config.publisher_settings());
    let published = publisher.publish(message).await;

    if let Err(e) = publisher.shutdown(config.publish_grace()).await {
        print_warning(&format!("Publisher shutdown: {}", e));
    }

    let id = published.with_context(|| format!("Failed to publish to {}", topic))?;
    print_success(&format!("Message published with ID: {}", id));
    Ok(id)
}

/// Wait for one message, ack it, and stop the stream.
pub async fn receive<I>(
    config: &ProbeConfig,
    backend: Arc<dyn PubsubBackend>,
    interrupt: I,
) -> Result<ReceiveReport>
where
    I: Future<Output = ()>,
{
    let subscription = config.subscription()?;
    print_info(&format!("Waiting for {} message...", receiver::MESSAGE_THRESHOLD));

    let report = receiver::receive(
        backend,
        subscription.clone(),
        &config.receiver_settings(),
        print_delivered,
        interrupt,
    )
    .await
    .with_context(|| format!("Failed to receive from {}", subscription))?;

    match report.outcome {
        WaitOutcome::Cancelled => {}
        WaitOutcome::Interrupted => print_warning("Interrupted before a message arrived"),
        WaitOutcome::TimedOut => print_warning("No message arrived before the wait timeout"),
    }
    let states: Vec<String> = report.states.iter().map(|s| s.to_string()).collect();
    info!("Receiver states: {}", states.join(" -> "));
    print_info("Local Pub/Sub test finished.");
    Ok(report)
}

/// Execute the run command: provision, publish, then optionally receive
pub async fn execute<I>(
    config: &ProbeConfig,
    backend: Arc<dyn PubsubBackend>,
    payload: Payload,
    with_receive: bool,
    interrupt: I,
) -> Result<Vec<StepSummary>>
where
    I: Future<Output = ()>,
{
    info!(
        backend = backend.name(),
        endpoint = %config.broker.endpoint,
        "Starting Pub/Sub probe"
    );

    let mut summary = provision(config, backend.clone()).await?;

    let topic = config.topic()?;
    let id = publish(config, backend.clone(), payload).await?;
    summary.push(StepSummary::new("publish", &topic, format!("message id {}", id)));

    if with_receive {
        let report = receive(config, backend, interrupt).await?;
        let result = match report.messages.first() {
            Some(message) => format!("acked {} ({:?})", message.message_id, report.outcome),
            None => format!("no message ({:?})", report.outcome),
        };
        summary.push(StepSummary::new("receive", config.subscription()?, result));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::pubsub::memory::InMemoryBackend;

    fn memory_config() -> ProbeConfig {
        let mut config = ProbeConfig::default();
        config.broker.backend = BackendKind::Memory;
        config
    }

    #[tokio::test]
    async fn test_provision_summary() {
        let backend = Arc::new(InMemoryBackend::new());
        let summary = provision(&memory_config(), backend).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].result, "created");
        assert_eq!(summary[1].result, "created");
    }

    #[tokio::test]
    async fn test_run_with_receive() {
        let backend = Arc::new(InMemoryBackend::new());
        let summary = execute(
            &memory_config(),
            backend,
            Payload::Text("hello".to_string()),
            true,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.len(), 4);
        assert_eq!(summary[2].step, "publish");
        assert!(summary[3].result.starts_with("acked"));
        assert!(summary[3].result.contains("Cancelled"));
    }
}
