//! Streaming speech-to-text gateways.

pub mod deepgram;

pub use deepgram::DeepgramStt;
