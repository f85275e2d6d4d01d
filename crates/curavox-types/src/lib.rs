//! Shared domain types for Curavox.
//!
//! This crate contains the types used across the Curavox voice agent:
//! conversation messages, the client/server WebSocket protocol, the
//! medical summary record, provider configuration, and the gateway
//! error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;
pub mod protocol;
pub mod summary;
