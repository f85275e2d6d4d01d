//! Client/server WebSocket protocol messages.
//!
//! Both directions are closed tagged-variant enums validated at the
//! boundary before dispatch. Inbound frames that do not parse into
//! [`ClientMessage`] are rejected per-message with a
//! [`ServerMessage::Error`] reply; they never terminate the connection.
//!
//! Inbound audio may arrive either as raw binary frames or as
//! `{"type":"audio","data":"<base64>"}` text frames -- the two are
//! interchangeable on the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::summary::MedicalSummary;

/// A message sent by the client over the WebSocket as a text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Audio payload, base64-encoded PCM16 mono.
    Audio { data: String },
    /// End the conversation and request the structured summary.
    EndSession,
    /// Transport-level liveness ping. Accepted and ignored.
    KeepAlive,
}

impl ClientMessage {
    /// Decode the base64 payload of an `Audio` message.
    ///
    /// Returns `None` for non-audio variants or undecodable payloads.
    pub fn decode_audio(&self) -> Option<Vec<u8>> {
        match self {
            ClientMessage::Audio { data } => BASE64.decode(data).ok(),
            _ => None,
        }
    }
}

/// Conversation status reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Listening,
    Thinking,
    Speaking,
    Idle,
    Error,
}

/// A message sent by the server over the WebSocket, always as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Transcription result, interim or final.
    Transcript { text: String, is_final: bool },
    /// Conversation state update.
    Status { status: Status },
    /// The agent's reply text for the current turn.
    Response { text: String },
    /// Synthesized speech, base64-encoded.
    Audio { data: String, format: String },
    /// The structured summary emitted at session end.
    Summary { data: MedicalSummary },
    /// A recoverable per-message error.
    Error { message: String },
}

impl ServerMessage {
    /// Build an `Audio` message from raw MP3 bytes.
    pub fn mp3_audio(bytes: &[u8]) -> Self {
        ServerMessage::Audio {
            data: BASE64.encode(bytes),
            format: "mp3".to_string(),
        }
    }

    /// Build a `Status` message.
    pub fn status(status: Status) -> Self {
        ServerMessage::Status { status }
    }
}
