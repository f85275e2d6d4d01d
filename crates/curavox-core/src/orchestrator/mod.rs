//! Per-connection duplex orchestrator.
//!
//! One orchestrator runs per client connection. It consumes client frames
//! and STT transcript events, turns each completed utterance into exactly
//! one LLM turn, drives text-to-speech playback back to the client, and
//! produces the structured summary when the conversation ends.
//!
//! The conversation state machine:
//!
//! ```text
//! Init -> Greeting -> Listening <-> Transcribing -> Thinking -> Speaking -> Listening ...
//! ```
//!
//! with `Ending -> Closed` reachable from any conversational state via the
//! `end_session` control message, and `Closed` reached directly on
//! transport loss. Teardown is ordered: the STT stream is closed (which
//! cancels and awaits its listen/keepalive tasks) before the session is
//! removed from the registry.
//!
//! Turn handling runs on its own task so that overlapping final
//! transcripts from the provider race against the in-flight permit the
//! same way they race in production; the permit is the sole
//! synchronization primitive for the turn-handling critical section.

pub mod flight;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use curavox_types::message::{ConversationTurn, Role};
use curavox_types::protocol::{ClientMessage, ServerMessage, Status};
use curavox_types::summary::MedicalSummary;

use crate::gateway::{LanguageModel, SpeechSynthesis, SpeechToText, SttEvent, SttStream};
use crate::registry::SessionRegistry;
use flight::{InFlight, TurnPermit};

/// Greeting spoken when a connection is accepted.
pub const GREETING_TEXT: &str = "Hello! I'm your medical assistant. How can I help you today?";

/// Goodbye spoken when the client ends the session.
pub const GOODBYE_TEXT: &str = "Thank you for sharing. Take care and feel better soon!";

/// Substituted for the reply when the LLM call fails.
pub const APOLOGY_TEXT: &str =
    "I apologize, I'm having trouble processing that. Could you please repeat what you said?";

/// Number of most recent conversation turns sent to the LLM per reply.
pub const CONVERSATION_WINDOW: usize = 10;

/// A frame received from the client transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Raw little-endian PCM16 mono audio.
    Binary(Vec<u8>),
    /// A JSON text frame, parsed as [`ClientMessage`] at the boundary.
    Text(String),
    /// The transport closed (client disconnect or receive error).
    Closed,
}

/// Connection state, tracked for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Init,
    Greeting,
    Listening,
    Transcribing,
    Thinking,
    Speaking,
    Ending,
    Closed,
}

/// Per-session mutable state shared between the receive loop and the
/// turn task: the connection state and the single-flight turn flag.
#[derive(Debug, Clone)]
pub struct SessionState {
    conn: Arc<Mutex<ConnState>>,
    flight: InFlight,
}

impl SessionState {
    fn new() -> Self {
        Self {
            conn: Arc::new(Mutex::new(ConnState::Init)),
            flight: InFlight::new(),
        }
    }

    /// Current connection state.
    pub fn conn_state(&self) -> ConnState {
        *self.conn.lock().expect("conn state lock poisoned")
    }

    fn set_conn_state(&self, to: ConnState) {
        let mut conn = self.conn.lock().expect("conn state lock poisoned");
        tracing::debug!(from = ?*conn, to = ?to, "state transition");
        *conn = to;
    }

    fn try_begin_turn(&self) -> Option<TurnPermit> {
        self.flight.try_acquire()
    }

    /// Whether a turn is currently in flight.
    pub fn turn_in_flight(&self) -> bool {
        self.flight.is_set()
    }
}

/// The per-connection duplex orchestrator.
pub struct Orchestrator<S, L, T> {
    registry: Arc<SessionRegistry>,
    stt: Arc<S>,
    llm: Arc<L>,
    tts: Arc<T>,
    outbound: mpsc::Sender<ServerMessage>,
}

impl<S, L, T> Orchestrator<S, L, T>
where
    S: SpeechToText,
    L: LanguageModel + 'static,
    T: SpeechSynthesis + 'static,
{
    pub fn new(
        registry: Arc<SessionRegistry>,
        stt: Arc<S>,
        llm: Arc<L>,
        tts: Arc<T>,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            registry,
            stt,
            llm,
            tts,
            outbound,
        }
    }

    /// Run the connection to completion.
    ///
    /// Creates the session, opens the STT stream, serves the duplex loop,
    /// then tears down in order: STT stream closed (listen and keepalive
    /// tasks cancelled and awaited), session removed from the registry.
    pub async fn run(self, inbound: mpsc::Receiver<ClientFrame>) {
        let session_id = self.registry.create();
        let state = SessionState::new();

        let (stt_stream, events) = match self.stt.open().await {
            Ok(open) => open,
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "failed to open STT session");
                let _ = self
                    .send(ServerMessage::Error {
                        message: "speech recognition is unavailable".to_string(),
                    })
                    .await;
                self.registry.end(session_id);
                return;
            }
        };

        let engine = TurnEngine {
            session_id,
            registry: Arc::clone(&self.registry),
            llm: Arc::clone(&self.llm),
            tts: Arc::clone(&self.tts),
            outbound: self.outbound.clone(),
            state: state.clone(),
        };

        self.serve(session_id, &stt_stream, events, inbound, &engine, &state)
            .await;

        state.set_conn_state(ConnState::Closed);
        stt_stream.close().await;
        self.registry.end(session_id);
        tracing::info!(session_id = %session_id, "connection closed");
    }

    /// The duplex loop: greeting, then audio/control frames multiplexed
    /// with STT events until the session ends or the transport drops.
    async fn serve(
        &self,
        session_id: Uuid,
        stt_stream: &S::Stream,
        mut events: mpsc::Receiver<SttEvent>,
        mut inbound: mpsc::Receiver<ClientFrame>,
        engine: &TurnEngine<L, T>,
        state: &SessionState,
    ) {
        state.set_conn_state(ConnState::Greeting);
        if self.send(ServerMessage::status(Status::Speaking)).await.is_err() {
            return;
        }
        match self.tts.synthesize(GREETING_TEXT).await {
            Ok(audio) if !audio.is_empty() => {
                if self.send(ServerMessage::mp3_audio(&audio)).await.is_err() {
                    return;
                }
            }
            Ok(_) => {
                tracing::debug!(session_id = %session_id, "greeting synthesis returned no audio")
            }
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "greeting synthesis failed, skipping audio")
            }
        }
        self.registry
            .add_message(session_id, Role::Assistant, GREETING_TEXT);
        if self.send(ServerMessage::status(Status::Listening)).await.is_err() {
            return;
        }
        state.set_conn_state(ConnState::Listening);

        let mut stt_done = false;
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(ClientFrame::Binary(bytes)) => {
                        self.forward_audio(session_id, stt_stream, &bytes).await;
                    }
                    Some(ClientFrame::Text(text)) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg @ ClientMessage::Audio { .. }) => match msg.decode_audio() {
                                Some(bytes) => {
                                    self.forward_audio(session_id, stt_stream, &bytes).await;
                                }
                                None => {
                                    tracing::warn!(session_id = %session_id, "undecodable audio payload");
                                    if self
                                        .send(ServerMessage::Error {
                                            message: "invalid base64 audio payload".to_string(),
                                        })
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                            },
                            Ok(ClientMessage::EndSession) => {
                                self.finish(session_id, state).await;
                                return;
                            }
                            Ok(ClientMessage::KeepAlive) => {}
                            Err(err) => {
                                // Malformed frames are rejected per-message;
                                // the connection keeps serving.
                                tracing::warn!(session_id = %session_id, error = %err, "ignoring malformed client frame");
                                if self
                                    .send(ServerMessage::Error {
                                        message: format!("malformed message: {err}"),
                                    })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                    Some(ClientFrame::Closed) | None => {
                        tracing::info!(session_id = %session_id, "transport closed");
                        return;
                    }
                },
                event = events.recv(), if !stt_done => match event {
                    Some(SttEvent::Transcript { text, is_final }) => {
                        if self
                            .send(ServerMessage::Transcript {
                                text: text.clone(),
                                is_final,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                        if !is_final {
                            state.set_conn_state(ConnState::Transcribing);
                        } else if !text.trim().is_empty() {
                            if engine.try_begin_turn(&text) {
                                tracing::info!(session_id = %session_id, "turn started");
                            } else {
                                tracing::info!(session_id = %session_id, "turn in flight, dropping duplicate final transcript");
                            }
                        }
                    }
                    Some(SttEvent::Error(message)) => {
                        tracing::warn!(session_id = %session_id, error = %message, "STT provider error");
                        if self.send(ServerMessage::Error { message }).await.is_err() {
                            return;
                        }
                    }
                    Some(SttEvent::Closed) => {
                        tracing::warn!(session_id = %session_id, "STT stream closed by provider");
                    }
                    None => {
                        stt_done = true;
                    }
                },
            }
        }
    }

    /// Forward an audio chunk to the STT stream. Zero-length chunks are
    /// dropped without forwarding.
    async fn forward_audio(&self, session_id: Uuid, stt_stream: &S::Stream, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(err) = stt_stream.send_audio(bytes).await {
            tracing::warn!(session_id = %session_id, error = %err, "failed to forward audio to STT");
        }
    }

    /// Orderly end of conversation: summary over the full history, the
    /// goodbye utterance, the summary message, then idle.
    async fn finish(&self, session_id: Uuid, state: &SessionState) {
        state.set_conn_state(ConnState::Ending);
        if self.send(ServerMessage::status(Status::Thinking)).await.is_err() {
            return;
        }

        // The summary always sees the full, untruncated history.
        let history = self.registry.get_conversation(session_id);
        let summary = match self.llm.summarize(&history).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "summary generation failed, using fallback");
                MedicalSummary::fallback()
            }
        };

        match self.tts.synthesize(GOODBYE_TEXT).await {
            Ok(audio) if !audio.is_empty() => {
                if self.send(ServerMessage::mp3_audio(&audio)).await.is_err() {
                    return;
                }
            }
            Ok(_) => tracing::debug!(session_id = %session_id, "goodbye synthesis returned no audio"),
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "goodbye synthesis failed, skipping audio")
            }
        }

        if self.send(ServerMessage::Summary { data: summary }).await.is_err() {
            return;
        }
        let _ = self.send(ServerMessage::status(Status::Idle)).await;
    }

    async fn send(&self, msg: ServerMessage) -> Result<(), ()> {
        self.outbound.send(msg).await.map_err(|_| ())
    }
}

/// Runs one turn (transcript -> response -> synthesis) on its own task.
///
/// Cloneable so the spawned task owns everything it needs; all handles
/// are shared with the orchestrator that created it.
pub(crate) struct TurnEngine<L, T> {
    session_id: Uuid,
    registry: Arc<SessionRegistry>,
    llm: Arc<L>,
    tts: Arc<T>,
    outbound: mpsc::Sender<ServerMessage>,
    state: SessionState,
}

impl<L, T> Clone for TurnEngine<L, T> {
    fn clone(&self) -> Self {
        Self {
            session_id: self.session_id,
            registry: Arc::clone(&self.registry),
            llm: Arc::clone(&self.llm),
            tts: Arc::clone(&self.tts),
            outbound: self.outbound.clone(),
            state: self.state.clone(),
        }
    }
}

impl<L, T> TurnEngine<L, T>
where
    L: LanguageModel + 'static,
    T: SpeechSynthesis + 'static,
{
    /// Attempt to start a turn for a final transcript.
    ///
    /// Returns `false` when a turn is already in flight -- the duplicate
    /// final transcript is dropped. This is the single-flight guard.
    pub(crate) fn try_begin_turn(&self, transcript: &str) -> bool {
        let Some(permit) = self.state.try_begin_turn() else {
            return false;
        };
        let engine = self.clone();
        let transcript = transcript.to_string();
        tokio::spawn(async move {
            engine.run_turn(transcript, permit).await;
        });
        true
    }

    async fn run_turn(self, transcript: String, permit: TurnPermit) {
        // Released when this scope exits, on every path.
        let _permit = permit;

        self.state.set_conn_state(ConnState::Thinking);
        if self.send(ServerMessage::status(Status::Thinking)).await.is_err() {
            return;
        }

        self.registry
            .add_message(self.session_id, Role::User, &transcript);

        let conversation = self.registry.get_conversation(self.session_id);
        let window = conversation_window(&conversation);
        let response = match self.llm.respond(window).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "completion failed, substituting apology");
                APOLOGY_TEXT.to_string()
            }
        };

        self.registry
            .add_message(self.session_id, Role::Assistant, &response);
        if self
            .send(ServerMessage::Response {
                text: response.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        self.state.set_conn_state(ConnState::Speaking);
        if self.send(ServerMessage::status(Status::Speaking)).await.is_err() {
            return;
        }

        match self.tts.synthesize(&response).await {
            Ok(audio) if !audio.is_empty() => {
                if self.send(ServerMessage::mp3_audio(&audio)).await.is_err() {
                    return;
                }
            }
            Ok(_) => tracing::debug!(session_id = %self.session_id, "synthesis returned no audio"),
            Err(err) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "synthesis failed, skipping audio")
            }
        }

        self.state.set_conn_state(ConnState::Listening);
        let _ = self.send(ServerMessage::status(Status::Listening)).await;
    }

    async fn send(&self, msg: ServerMessage) -> Result<(), ()> {
        self.outbound.send(msg).await.map_err(|_| ())
    }
}

/// The most recent [`CONVERSATION_WINDOW`] turns (oldest-first truncation).
pub fn conversation_window(turns: &[ConversationTurn]) -> &[ConversationTurn] {
    let start = turns.len().saturating_sub(CONVERSATION_WINDOW);
    &turns[start..]
}

#[cfg(test)]
mod tests;
