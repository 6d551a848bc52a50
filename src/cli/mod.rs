// CLI module for pubsub-probe
/// Command execution handlers
pub mod commands;
/// Output formatting utilities
pub mod output;

use clap::{Args, Parser, Subcommand};

use crate::config::{BackendKind, LogFormat, ProbeConfig};
use crate::core::payload::DEFAULT_SOURCE;

/// Command-line interface for pubsub-probe
#[derive(Parser)]
#[command(name = "pubsub-probe")]
#[command(author, version, about = "Smoke test for GCP Pub/Sub and the Pub/Sub emulator", long_about = None)]
pub struct Cli {
    /// Connection and resource options shared by all commands
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Broker address (host:port)
    #[arg(long, global = true, env = "PUBSUB_EMULATOR_HOST", default_value = "localhost:8085")]
    pub endpoint: String,

    /// GCP project ID
    #[arg(long, global = true, env = "PUBSUB_PROJECT_ID", default_value = "app-test-pub-sub")]
    pub project: String,

    /// Topic ID, or a fully qualified `projects/{p}/topics/{t}` name
    #[arg(long, global = true, env = "PUBSUB_TOPIC_ID", default_value = "app-test-pub-sub-topic")]
    pub topic: String,

    /// Subscription ID, or a fully qualified `projects/{p}/subscriptions/{s}` name
    #[arg(
        long,
        global = true,
        env = "PUBSUB_SUBSCRIPTION_ID",
        default_value = "app-test-pub-sub-subscription"
    )]
    pub subscription: String,

    /// Subscription ack deadline in seconds
    #[arg(long, global = true, env = "PUBSUB_ACK_DEADLINE", default_value = "10")]
    pub ack_deadline: u64,

    /// Channel connect timeout in seconds
    #[arg(long, global = true, env = "PUBSUB_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Broker backend (grpc | memory)
    #[arg(long, global = true, env = "PUBSUB_PROBE_BACKEND", default_value = "grpc")]
    pub backend: String,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, env = "PUBSUB_PROBE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text | json)
    #[arg(long, global = true, env = "PUBSUB_PROBE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

/// What to publish
#[derive(Args, Debug, Clone)]
pub struct PayloadArgs {
    /// Publish this text instead of the default start notice
    #[arg(long, short, conflicts_with = "record")]
    pub message: Option<String>,

    /// Publish the demo patient visit record as JSON
    #[arg(long)]
    pub record: bool,

    /// Value of the `source` attribute
    #[arg(long, env = "PUBSUB_PROBE_SOURCE", default_value = DEFAULT_SOURCE)]
    pub source: String,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Provision, publish one message, and optionally receive one
    Run {
        /// Payload options
        #[command(flatten)]
        payload: PayloadArgs,

        /// Also receive and acknowledge one message
        #[arg(long)]
        receive: bool,

        /// Stop waiting for a message after this many seconds
        #[arg(long, env = "PUBSUB_PROBE_WAIT_TIMEOUT")]
        wait_timeout: Option<u64>,

        /// Summary format (table | json)
        #[arg(long, short, default_value = "table")]
        format: String,
    },

    /// Create the topic and subscription if missing
    Provision,

    /// Publish one message
    Publish {
        /// Payload options
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Receive and acknowledge one message
    Receive {
        /// Stop waiting for a message after this many seconds
        #[arg(long, env = "PUBSUB_PROBE_WAIT_TIMEOUT")]
        wait_timeout: Option<u64>,
    },

    /// Show the effective configuration
    Config {
        /// Output format (table | json)
        #[arg(long, short, default_value = "json")]
        format: String,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl GlobalArgs {
    /// Configuration with these options applied over the defaults.
    pub fn to_config(&self) -> ProbeConfig {
        let mut config = ProbeConfig::default();
        config.broker.endpoint = self.endpoint.clone();
        config.broker.backend = BackendKind::parse(&self.backend);
        config.broker.connect_timeout_secs = self.connect_timeout;
        config.resources.project_id = self.project.clone();
        config.resources.topic_id = self.topic.clone();
        config.resources.subscription_id = self.subscription.clone();
        config.resources.ack_deadline_secs = self.ack_deadline;
        config.logging.level = self.log_level.clone();
        config.logging.format = LogFormat::parse(&self.log_format);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_config() {
        let cli = Cli::try_parse_from(["pubsub-probe", "provision"]).unwrap();
        let config = cli.global.to_config();
        let defaults = ProbeConfig::default();
        assert_eq!(config.broker.endpoint, defaults.broker.endpoint);
        assert_eq!(config.resources.project_id, defaults.resources.project_id);
        assert_eq!(config.resources.topic_id, defaults.resources.topic_id);
        assert_eq!(config.resources.subscription_id, defaults.resources.subscription_id);
        assert_eq!(config.resources.ack_deadline_secs, 10);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "pubsub-probe",
            "run",
            "--receive",
            "--message",
            "hello",
            "--backend",
            "memory",
        ])
        .unwrap();
        assert_eq!(cli.global.to_config().broker.backend, BackendKind::Memory);
        match cli.command {
            Commands::Run {
                payload, receive, ..
            } => {
                assert!(receive);
                assert_eq!(payload.message.as_deref(), Some("hello"));
                assert!(!payload.record);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_fully_qualified_topic_flag() {
        let cli = Cli::try_parse_from([
            "pubsub-probe",
            "provision",
            "--topic",
            "projects/other-project/topics/t1",
            "--subscription",
            "s1",
        ])
        .unwrap();
        let config = cli.global.to_config();
        assert_eq!(config.topic().unwrap().project(), "other-project");
        assert_eq!(config.subscription().unwrap().project(), config.resources.project_id);
    }

    #[test]
    fn test_message_conflicts_with_record() {
        let result = Cli::try_parse_from(["pubsub-probe", "publish", "--message", "x", "--record"]);
        assert!(result.is_err());
    }
}
