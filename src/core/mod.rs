//! The probe's steps: provision, publish, receive.

pub mod payload;
pub mod provisioner;
pub mod publisher;
pub mod receiver;
pub mod shutdown;
pub mod subscriber;
