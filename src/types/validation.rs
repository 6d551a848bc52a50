//! Client-side checks for identifiers and message sizes.
//!
//! These only reject values that can never form a resource name. Length and
//! character-class rules beyond that are left to the broker, since the
//! emulator is more permissive than the managed service.

use crate::error::ValidationError;
use crate::Result;

/// Maximum length of a topic or subscription ID.
pub const MAX_RESOURCE_ID_LEN: usize = 255;

/// Pub/Sub maximum message size (10 MB).
pub const PUBSUB_MAX_MESSAGE_SIZE: usize = 10_485_760;

/// Project ID validation (non-empty, no path separators or whitespace).
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id.is_empty() {
        return Err(ValidationError::InvalidProjectId("Project ID must not be empty".to_string()).into());
    }

    if let Some(ch) = find_forbidden_char(project_id) {
        return Err(ValidationError::InvalidProjectId(format!(
            "Project ID contains invalid character: '{}'",
            ch
        ))
        .into());
    }

    Ok(())
}

/// Topic ID validation (1-255 chars, no path separators or whitespace).
pub fn validate_topic_id(topic_id: &str) -> Result<()> {
    if topic_id.is_empty() || topic_id.len() > MAX_RESOURCE_ID_LEN {
        return Err(ValidationError::InvalidTopicId(format!(
            "Topic ID must be 1-{} characters, got {}",
            MAX_RESOURCE_ID_LEN,
            topic_id.len()
        ))
        .into());
    }

    if let Some(ch) = find_forbidden_char(topic_id) {
        return Err(ValidationError::InvalidTopicId(format!(
            "Topic ID contains invalid character: '{}'",
            ch
        ))
        .into());
    }

    Ok(())
}

/// Subscription ID validation (1-255 chars, no path separators or whitespace).
pub fn validate_subscription_id(subscription_id: &str) -> Result<()> {
    if subscription_id.is_empty() || subscription_id.len() > MAX_RESOURCE_ID_LEN {
        return Err(ValidationError::InvalidSubscriptionId(format!(
            "Subscription ID must be 1-{} characters, got {}",
            MAX_RESOURCE_ID_LEN,
            subscription_id.len()
        ))
        .into());
    }

    if let Some(ch) = find_forbidden_char(subscription_id) {
        return Err(ValidationError::InvalidSubscriptionId(format!(
            "Subscription ID contains invalid character: '{}'",
            ch
        ))
        .into());
    }

    Ok(())
}

/// Validate message size against the Pub/Sub limit.
pub fn validate_message_size(size: usize) -> Result<()> {
    if size > PUBSUB_MAX_MESSAGE_SIZE {
        return Err(ValidationError::MessageTooLarge {
            size,
            max: PUBSUB_MAX_MESSAGE_SIZE,
        }
        .into());
    }
    Ok(())
}

fn find_forbidden_char(id: &str) -> Option<char> {
    id.chars().find(|ch| *ch == '/' || ch.is_whitespace() || ch.is_control())
}
