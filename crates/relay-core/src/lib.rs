//! Dispatch pipeline and collaborator traits for the chat relay.
//!
//! This crate defines the "ports" (`CompletionBackend`, `Transport`) that
//! the infrastructure layer implements, and the pipeline components built
//! on them. It depends only on `relay-types` -- never on `relay-infra` or
//! any network crate.

pub mod backend;
pub mod cache;
pub mod conversation;
pub mod dispatch;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod timeout;
pub mod transport;
