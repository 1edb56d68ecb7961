//! HTTP request handlers for the stats API.

pub mod chat;
pub mod stats;
