//! Streaming subscriber: runs the backend's receive loop on a worker task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pubsub::{HandlerFuture, MessageHandler, PubsubBackend, SubscriptionName};
use crate::types::ReceivedMessage;

pub use crate::pubsub::Reply;

/// A subscriber bound to one subscription, not yet streaming.
pub struct Subscriber {
    backend: Arc<dyn PubsubBackend>,
    subscription: SubscriptionName,
}

impl Subscriber {
    /// Create a subscriber.
    pub fn new(backend: Arc<dyn PubsubBackend>, subscription: SubscriptionName) -> Self {
        Self {
            backend,
            subscription,
        }
    }

    /// Start streaming and dispatching messages to `handler`.
    ///
    /// The handler gets each message and the subscriber's stop token.
    /// Failures to open or keep the stream surface from
    /// [`SubscriberHandle::stop`].
    pub fn start<F, Fut>(self, handler: F) -> SubscriberHandle
    where
        F: Fn(ReceivedMessage, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let ended = CancellationToken::new();

        let message_handler: MessageHandler = {
            let stop = stop.clone();
            Arc::new(move |message: ReceivedMessage| -> HandlerFuture {
                Box::pin(handler(message, stop.clone()))
            })
        };

        let worker = tokio::spawn({
            let backend = self.backend.clone();
            let subscription = self.subscription.clone();
            let stop = stop.clone();
            let ended = ended.clone();
            async move {
                let _ended = ended.drop_guard();
                let result = backend.receive(&subscription, message_handler, stop).await;
                if let Err(e) = &result {
                    warn!("Stream on {} ended with error: {}", subscription, e);
                }
                result
            }
        });

        info!("Subscriber streaming on {}", self.subscription);
        SubscriberHandle {
            subscription: self.subscription,
            stop,
            ended,
            worker,
        }
    }
}

/// A running subscriber.
pub struct SubscriberHandle {
    subscription: SubscriptionName,
    stop: CancellationToken,
    ended: CancellationToken,
    worker: JoinHandle<Result<()>>,
}

impl SubscriberHandle {
    /// Whether the stream worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Resolves once the stream worker has exited, for whatever reason.
    pub async fn stream_ended(&self) {
        self.ended.cancelled().await
    }

    /// Signal the stream to stop and wait up to `grace` for it to close.
    ///
    /// Returns the stream's own error if it failed before or while stopping.
    pub async fn stop(self, grace: Duration) -> Result<()> {
        let SubscriberHandle {
            subscription,
            stop,
            ended: _,
            mut worker,
        } = self;
        stop.cancel();

        info!("Stopping subscriber on {} (grace {:?})", subscription, grace);
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(result)) => {
                debug!("Subscriber on {} stopped", subscription);
                result
            }
            Ok(Err(e)) => Err(Error::Internal(format!("Subscriber worker failed: {}", e))),
            Err(_) => {
                warn!("Subscriber on {} did not stop within {:?}", subscription, grace);
                worker.abort();
                Err(Error::ShutdownTimeout(grace))
            }
        }
    }
}
