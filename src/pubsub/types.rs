//! Resource names for Pub/Sub topics and subscriptions.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, ValidationError};
use crate::types::validation::{validate_project_id, validate_subscription_id, validate_topic_id};

/// A topic reference: `projects/{project}/topics/{topic}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName {
    project: String,
    topic: String,
}

impl TopicName {
    /// Build a topic name from its parts.
    pub fn new(project: impl Into<String>, topic: impl Into<String>) -> Result<Self> {
        let project = project.into();
        let topic = topic.into();
        validate_project_id(&project)?;
        validate_topic_id(&topic)?;
        Ok(Self { project, topic })
    }

    /// The GCP project ID.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The topic ID.
    pub fn topic_id(&self) -> &str {
        &self.topic
    }

    /// Parse a fully qualified topic name.
    pub fn parse(name: &str) -> Result<Self> {
        let (project, topic) = split_resource_name(name, "topics")?;
        Self::new(project, topic)
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/topics/{}", self.project, self.topic)
    }
}

impl FromStr for TopicName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A subscription reference: `projects/{project}/subscriptions/{subscription}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionName {
    project: String,
    subscription: String,
}

impl SubscriptionName {
    /// Build a subscription name from its parts.
    pub fn new(project: impl Into<String>, subscription: impl Into<String>) -> Result<Self> {
        let project = project.into();
        let subscription = subscription.into();
        validate_project_id(&project)?;
        validate_subscription_id(&subscription)?;
        Ok(Self {
            project,
            subscription,
        })
    }

    /// The GCP project ID.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The subscription ID.
    pub fn subscription_id(&self) -> &str {
        &self.subscription
    }

    /// Parse a fully qualified subscription name.
    pub fn parse(name: &str) -> Result<Self> {
        let (project, subscription) = split_resource_name(name, "subscriptions")?;
        Self::new(project, subscription)
    }
}

impl fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/subscriptions/{}",
            self.project, self.subscription
        )
    }
}

impl FromStr for SubscriptionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split `projects/{project}/{collection}/{id}` into `(project, id)`.
fn split_resource_name<'a>(name: &'a str, collection: &str) -> Result<(&'a str, &'a str)> {
    let parts: Vec<&str> = name.split('/').collect();

    if parts.len() != 4 || parts[0] != "projects" {
        return Err(ValidationError::InvalidResourceName(format!(
            "Invalid resource name format: {}",
            name
        ))
        .into());
    }

    if parts[2] != collection {
        return Err(ValidationError::InvalidResourceName(format!(
            "Expected {} resource, got {}",
            collection, parts[2]
        ))
        .into());
    }

    Ok((parts[1], parts[3]))
}
