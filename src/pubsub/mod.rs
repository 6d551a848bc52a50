//! GCP Pub/Sub client plumbing.
//!
//! This module covers the broker side of the probe:
//! - Resource names for topics and subscriptions
//! - The [`PubsubBackend`] seam, with a backend on the google-cloud-pubsub
//!   client and an in-memory one

pub mod backend;
pub mod grpc;
pub mod memory;
pub mod types;

pub use backend::{
    HandlerFuture, MessageHandler, PublisherSettings, PubsubBackend, Reply, TopicPublisher,
};
pub use types::*;
