//! Error types for pubsub-probe.

use std::time::Duration;

use google_cloud_gax::grpc::{Code, Status};
use thiserror::Error;

/// Result type for pubsub-probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pubsub-probe.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The broker reported that the resource already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The broker could not find the referenced resource.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other non-OK gRPC status.
    #[error("RPC failed ({code:?}): {message}")]
    Rpc {
        /// gRPC status code.
        code: Code,
        /// Status message returned by the broker.
        message: String,
    },

    /// The Pub/Sub client could not be created.
    #[error("Client error: {0}")]
    Client(#[from] google_cloud_pubsub::client::Error),

    /// The broker accepted a publish but returned no usable message id.
    #[error("Broker returned no message id for topic {0}")]
    MissingMessageId(String),

    /// The streaming pull ended while a message was still awaited.
    #[error("Streaming pull for {0} ended")]
    StreamClosed(String),

    /// A shutdown did not finish within its grace period.
    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the broker rejected a create because the resource exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::AlreadyExists => Error::AlreadyExists(status.message().to_string()),
            Code::NotFound => Error::NotFound(status.message().to_string()),
            code => Error::Rpc {
                code,
                message: status.message().to_string(),
            },
        }
    }
}

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid project ID.
    #[error("Invalid project ID: {0}")]
    InvalidProjectId(String),

    /// Invalid topic ID.
    #[error("Invalid topic ID: {0}")]
    InvalidTopicId(String),

    /// Invalid subscription ID.
    #[error("Invalid subscription ID: {0}")]
    InvalidSubscriptionId(String),

    /// Message too large.
    #[error("Message too large: {size} bytes (max: {max} bytes)")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid fully qualified resource name.
    #[error("Invalid resource name: {0}")]
    InvalidResourceName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_is_conflict() {
        let err = Error::from(Status::already_exists("Topic already exists"));
        assert!(err.is_conflict());
        assert!(matches!(err, Error::AlreadyExists(ref m) if m == "Topic already exists"));
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err = Error::from(Status::not_found("no such topic"));
        assert!(!err.is_conflict());
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_other_codes_keep_code() {
        let err = Error::from(Status::unavailable("connection refused"));
        match err {
            Error::Rpc { code, message } => {
                assert_eq!(code, Code::Unavailable);
                assert_eq!(message, "connection refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
