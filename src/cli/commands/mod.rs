// Commands module
/// Probe steps and the run command
pub mod run;

use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use crate::cli::{output::*, Commands, PayloadArgs};
use crate::config::{BackendKind, ProbeConfig};
use crate::core::payload::{Payload, PatientVisit};
use crate::core::shutdown::wait_for_signal;
use crate::pubsub::grpc::GrpcBackend;
use crate::pubsub::memory::InMemoryBackend;
use crate::pubsub::PubsubBackend;

/// One configuration setting for table output
#[derive(Debug, Serialize, Tabled)]
struct ConfigEntry {
    key: String,
    value: String,
}

/// Execute a CLI command against the given configuration
pub async fn execute_command(command: Commands, mut config: ProbeConfig) -> anyhow::Result<()> {
    if let Commands::Config { format } = &command {
        return execute_config(&config, OutputFormat::parse(format));
    }

    match &command {
        Commands::Run { wait_timeout, .. } | Commands::Receive { wait_timeout } => {
            config.receive.wait_timeout_secs = *wait_timeout;
        }
        _ => {}
    }
    if let Commands::Run { payload, .. } | Commands::Publish { payload } = &command {
        config.publish.source = payload.source.clone();
    }

    config.validate().context("Invalid configuration")?;
    let backend = connect(&config).await?;

    match command {
        Commands::Run {
            payload,
            receive,
            format,
            ..
        } => {
            let summary = run::execute(
                &config,
                backend,
                build_payload(&payload),
                receive,
                wait_for_signal(),
            )
            .await?;
            println!();
            print_list(&summary, OutputFormat::parse(&format))
        }
        Commands::Provision => {
            run::provision(&config, backend).await?;
            Ok(())
        }
        Commands::Publish { payload } => {
            run::publish(&config, backend, build_payload(&payload)).await?;
            Ok(())
        }
        Commands::Receive { .. } => {
            run::receive(&config, backend, wait_for_signal()).await?;
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

/// Open the configured backend
pub async fn connect(config: &ProbeConfig) -> anyhow::Result<Arc<dyn PubsubBackend>> {
    match config.broker.backend {
        BackendKind::Grpc => {
            let backend = GrpcBackend::connect(&config.grpc())
                .await
                .with_context(|| format!("Failed to connect to {}", config.broker.endpoint))?;
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => {
            info!("Using in-memory broker; nothing leaves this process");
            Ok(Arc::new(InMemoryBackend::new()))
        }
    }
}

fn build_payload(args: &PayloadArgs) -> Payload {
    if args.record {
        Payload::Record(PatientVisit::sample())
    } else if let Some(message) = &args.message {
        Payload::Text(message.clone())
    } else {
        Payload::startup_notice(Local::now())
    }
}

fn execute_config(config: &ProbeConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
            Ok(())
        }
        OutputFormat::Table => {
            let value = serde_json::to_value(config)?;
            let mut entries = Vec::new();
            flatten_config("", &value, &mut entries);
            print_list(&entries, OutputFormat::Table)
        }
    }
}

fn flatten_config(prefix: &str, value: &serde_json::Value, out: &mut Vec<ConfigEntry>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_config(&path, child, out);
            }
        }
        serde_json::Value::String(s) => out.push(ConfigEntry {
            key: prefix.to_string(),
            value: s.clone(),
        }),
        serde_json::Value::Null => out.push(ConfigEntry {
            key: prefix.to_string(),
            value: "-".to_string(),
        }),
        other => out.push(ConfigEntry {
            key: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}
