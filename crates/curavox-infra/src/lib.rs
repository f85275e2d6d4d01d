//! Infrastructure implementations for Curavox.
//!
//! Concrete provider gateways behind the trait contracts in
//! curavox-core: Deepgram streaming STT, Groq chat completions, and
//! ElevenLabs speech synthesis. Also the configuration loader.

pub mod config;
pub mod llm;
pub mod stt;
pub mod tts;
