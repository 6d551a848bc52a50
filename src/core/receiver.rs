//! Receive-and-acknowledge step.
//!
//! Streams from the subscription, reports each delivered message, acks it and
//! cancels the wait once [`MESSAGE_THRESHOLD`] messages have been handled. The
//! stream is always stopped afterwards, however the wait ended.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::subscriber::{Reply, Subscriber};
use crate::pubsub::{PubsubBackend, SubscriptionName};
use crate::types::ReceivedMessage;
use crate::{Error, Result};

/// Messages to acknowledge before the wait is cancelled.
pub const MESSAGE_THRESHOLD: usize = 1;

/// Receiver lifecycle, logged as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReceiverState {
    /// Nothing opened yet.
    Idle,
    /// Stream open, waiting for deliveries.
    Streaming,
    /// A message was handed to the handler.
    MessageReceived,
    /// The handler asked for the message to be acked.
    Acknowledged,
    /// The wait is being torn down.
    Cancelling,
    /// The stream is closed.
    Stopped,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiverState::Idle => "idle",
            ReceiverState::Streaming => "streaming",
            ReceiverState::MessageReceived => "message-received",
            ReceiverState::Acknowledged => "acknowledged",
            ReceiverState::Cancelling => "cancelling",
            ReceiverState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// States a receive run passed through, shared with the stream worker.
#[derive(Clone)]
struct StateTrail(Arc<Mutex<Vec<ReceiverState>>>);

impl StateTrail {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(vec![ReceiverState::Idle])))
    }

    fn advance(&self, next: ReceiverState) {
        let mut states = self.0.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(prev) = states.last() {
            debug!("Receiver {} -> {}", prev, next);
        }
        states.push(next);
    }

    fn take(&self) -> Vec<ReceiverState> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

/// Why the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    /// The threshold was reached and the handler cancelled the wait.
    Cancelled,
    /// An external interrupt (e.g. Ctrl+C) fired first.
    Interrupted,
    /// The optional wait limit elapsed first.
    TimedOut,
}

/// One message as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveredMessage {
    /// Broker-assigned message ID.
    pub message_id: String,
    /// Payload decoded as UTF-8.
    pub data: String,
    /// Attributes as `k=v, k=v`.
    pub attributes: String,
    /// Broker publish time.
    pub publish_time: Option<DateTime<Utc>>,
}

impl From<&ReceivedMessage> for DeliveredMessage {
    fn from(received: &ReceivedMessage) -> Self {
        Self {
            message_id: received.message_id.to_string(),
            data: received.message.data_as_text(),
            attributes: received.message.format_attributes(),
            publish_time: received.publish_time,
        }
    }
}

/// Receiver tuning.
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    /// Grace period for stopping the stream.
    pub shutdown_grace: Duration,
    /// Give up waiting after this long. `None` waits forever.
    pub wait_limit: Option<Duration>,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
            wait_limit: None,
        }
    }
}

/// What a receive run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveReport {
    /// Messages handled, in delivery order.
    pub messages: Vec<DeliveredMessage>,
    /// How the wait ended.
    pub outcome: WaitOutcome,
    /// Lifecycle states passed through, in order.
    pub states: Vec<ReceiverState>,
}

/// Receive up to the threshold from `subscription`.
///
/// `on_message` is called from the stream worker for every accepted delivery,
/// before it is acknowledged. Deliveries past the threshold are nacked unseen.
/// `interrupt` ends the wait early when it completes. A stream that fails or
/// ends before the threshold is reached is an error.
pub async fn receive<H, I>(
    backend: Arc<dyn PubsubBackend>,
    subscription: SubscriptionName,
    settings: &ReceiverSettings,
    on_message: H,
    interrupt: I,
) -> Result<ReceiveReport>
where
    H: Fn(&DeliveredMessage) + Send + Sync + 'static,
    I: Future<Output = ()>,
{
    let trail = StateTrail::new();
    let done = CancellationToken::new();
    let count = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let handler = {
        let trail = trail.clone();
        let done = done.clone();
        let count = count.clone();
        let delivered = delivered.clone();
        let on_message = Arc::new(on_message);
        move |received: ReceivedMessage, stop: CancellationToken| {
            let trail = trail.clone();
            let done = done.clone();
            let count = count.clone();
            let delivered = delivered.clone();
            let on_message = on_message.clone();
            async move {
                let seen = count.fetch_add(1, Ordering::SeqCst) + 1;
                if seen > MESSAGE_THRESHOLD {
                    debug!("Returning message {} past the threshold", received.message_id);
                    return Reply::Nack;
                }

                trail.advance(ReceiverState::MessageReceived);
                let report = DeliveredMessage::from(&received);
                on_message(&report);
                delivered
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(report);
                trail.advance(ReceiverState::Acknowledged);

                if seen == MESSAGE_THRESHOLD {
                    stop.cancel();
                    done.cancel();
                }
                Reply::Ack
            }
        }
    };

    // Recorded first so a fast delivery cannot land ahead of it
    trail.advance(ReceiverState::Streaming);
    let handle = Subscriber::new(backend, subscription.clone()).start(handler);

    let wait_limit = async {
        match settings.wait_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    // `None` means the stream ended on its own
    let outcome = tokio::select! {
        biased;
        _ = done.cancelled() => Some(WaitOutcome::Cancelled),
        _ = interrupt => Some(WaitOutcome::Interrupted),
        _ = wait_limit => Some(WaitOutcome::TimedOut),
        _ = handle.stream_ended() => None,
    };

    match outcome {
        Some(WaitOutcome::Cancelled) => {}
        Some(other) => warn!("Stopped waiting on {} before any message: {:?}", subscription, other),
        None => warn!("Stream on {} ended before any message", subscription),
    }
    trail.advance(ReceiverState::Cancelling);

    let stopped = handle.stop(settings.shutdown_grace).await;
    trail.advance(ReceiverState::Stopped);

    let outcome = match (outcome, stopped) {
        (Some(outcome), Err(Error::ShutdownTimeout(grace))) => {
            warn!("Stream on {} was abandoned after {:?}", subscription, grace);
            outcome
        }
        (Some(WaitOutcome::Cancelled), Err(e)) => {
            warn!("Stream on {} failed after the message was handled: {}", subscription, e);
            WaitOutcome::Cancelled
        }
        (_, Err(e)) => return Err(e),
        (Some(outcome), Ok(())) => outcome,
        (None, Ok(())) => return Err(Error::StreamClosed(subscription.to_string())),
    };

    let messages = std::mem::take(&mut *delivered.lock().unwrap_or_else(|p| p.into_inner()));
    info!(
        "Receiver on {} finished: {} message(s), {:?}",
        subscription,
        messages.len(),
        outcome
    );
    Ok(ReceiveReport {
        messages,
        outcome,
        states: trail.take(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::{MessageHandler, PublisherSettings, TopicName, TopicPublisher};
    use crate::pubsub::memory::InMemoryBackend;
    use crate::types::SubscriptionConfig;
    use async_trait::async_trait;

    /// Backend whose stream closes cleanly without delivering anything
    struct ClosingStream;

    #[async_trait]
    impl PubsubBackend for ClosingStream {
        async fn create_topic(&self, _topic: &TopicName) -> Result<()> {
            Ok(())
        }

        async fn create_subscription(&self, _config: &SubscriptionConfig) -> Result<()> {
            Ok(())
        }

        fn publisher(&self, topic: &TopicName, settings: &PublisherSettings) -> Box<dyn TopicPublisher> {
            InMemoryBackend::new().publisher(topic, settings)
        }

        async fn receive(
            &self,
            _subscription: &SubscriptionName,
            _handler: MessageHandler,
            _cancel: CancellationToken,
        ) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "closing"
        }
    }

    #[tokio::test]
    async fn test_stream_closed_before_message() {
        let subscription = SubscriptionName::new("local-project", "s1").unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            receive(
                Arc::new(ClosingStream),
                subscription,
                &ReceiverSettings::default(),
                |_| {},
                std::future::pending(),
            ),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(Error::StreamClosed(ref s)) if s.ends_with("/subscriptions/s1")));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ReceiverState::MessageReceived.to_string(), "message-received");
        assert_eq!(ReceiverState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_default_settings() {
        let settings = ReceiverSettings::default();
        assert_eq!(settings.shutdown_grace, Duration::from_secs(5));
        assert!(settings.wait_limit.is_none());
    }

    #[test]
    fn test_state_trail_records_order() {
        let trail = StateTrail::new();
        trail.advance(ReceiverState::Streaming);
        trail.advance(ReceiverState::Cancelling);
        assert_eq!(
            trail.take(),
            vec![ReceiverState::Idle, ReceiverState::Streaming, ReceiverState::Cancelling]
        );
    }

    #[test]
    fn test_state_serializes_kebab_case() {
        let json = serde_json::to_value(ReceiverState::MessageReceived).unwrap();
        assert_eq!(json, "message-received");
    }
}
