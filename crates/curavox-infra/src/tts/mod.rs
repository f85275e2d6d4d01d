//! Text-to-speech gateways.

pub mod elevenlabs;

pub use elevenlabs::ElevenLabsTts;
