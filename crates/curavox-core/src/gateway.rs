//! Provider gateway contracts.
//!
//! These traits are the seams between the orchestrator and the external
//! speech/language providers. Concrete implementations live in
//! curavox-infra; orchestrator tests substitute hand-written doubles.
//!
//! All traits use native async fn in traits (RPITIT). The orchestrator is
//! generic over them, so no boxing is needed at the call sites.

use tokio::sync::mpsc;

use curavox_types::error::GatewayError;
use curavox_types::message::ConversationTurn;
use curavox_types::summary::MedicalSummary;

/// An event emitted asynchronously by an open STT streaming session.
///
/// Events interleave arbitrarily with audio chunk submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    /// A transcription result. `is_final` marks the utterance complete.
    Transcript { text: String, is_final: bool },
    /// A provider-side error. The session may still produce events.
    Error(String),
    /// The provider closed the stream; no further transcripts will arrive.
    Closed,
}

/// Handle to an open STT streaming session.
pub trait SttStream: Send + Sync + 'static {
    /// Submit a raw PCM16 mono audio chunk at the configured sample rate.
    fn send_audio(
        &self,
        chunk: &[u8],
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Close the session. Idempotent. Cancels any internally spawned
    /// listen/keepalive work and waits for it before returning.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// Streaming speech-to-text provider.
pub trait SpeechToText: Send + Sync {
    type Stream: SttStream;

    /// Open a streaming session with the provider using the fixed
    /// configuration the gateway was constructed with. Returns the
    /// session handle and the channel on which [`SttEvent`]s arrive.
    fn open(
        &self,
    ) -> impl std::future::Future<Output = Result<(Self::Stream, mpsc::Receiver<SttEvent>), GatewayError>>
    + Send;
}

/// Turn-based language model provider.
///
/// Errors carry the transient/configuration distinction so callers can
/// apply the documented fallback policy deterministically: the
/// orchestrator substitutes the fixed apology text for a failed
/// completion and [`MedicalSummary::fallback`] for a failed summary.
pub trait LanguageModel: Send + Sync {
    /// Produce a conversational reply for the given window of turns.
    fn respond(
        &self,
        window: &[ConversationTurn],
    ) -> impl std::future::Future<Output = Result<String, GatewayError>> + Send;

    /// Produce the structured end-of-session summary over the full,
    /// untruncated history. Implementations must map unparseable provider
    /// output to [`MedicalSummary::fallback`] rather than erroring.
    fn summarize(
        &self,
        history: &[ConversationTurn],
    ) -> impl std::future::Future<Output = Result<MedicalSummary, GatewayError>> + Send;
}

/// Text-to-speech synthesis provider.
pub trait SpeechSynthesis: Send + Sync {
    /// Synthesize speech for the given text. Empty output means "nothing
    /// to play"; the orchestrator skips the audio emission rather than
    /// treating it as fatal.
    fn synthesize(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, GatewayError>> + Send;
}
