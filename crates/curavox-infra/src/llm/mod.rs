//! Language model gateways.

pub mod groq;

pub use groq::GroqLlm;
