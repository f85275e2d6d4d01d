//! Observability setup for Curavox.

pub mod tracing_setup;
