//! Shared domain types for the chat relay.
//!
//! This crate contains the types passed between the relay's layers:
//! inbound messages and batches, conversation turns, completion wire
//! shapes, cache values, configuration, metrics snapshots, and the
//! error enums used at trait seams.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod message;
pub mod metrics;
