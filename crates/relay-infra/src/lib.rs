//! Infrastructure layer for the chat relay.
//!
//! Contains implementations of the ports defined in `relay-core` that need
//! the network or the filesystem: the HTTP completion backend and the
//! `relay.toml` configuration loader.

pub mod backend;
pub mod config;
