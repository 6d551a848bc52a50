//! # pubsub-probe
//!
//! A smoke test for Google Cloud Pub/Sub and the Pub/Sub emulator.
//!
//! The probe makes sure a topic and a pull subscription exist, publishes one
//! message, and can receive and acknowledge one message before exiting. The
//! broker is reached over plaintext gRPC, or replaced by an in-process backend
//! for dry runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod pubsub;
pub mod types;

pub use error::{Error, Result};
