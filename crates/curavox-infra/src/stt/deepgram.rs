//! DeepgramStt -- concrete [`SpeechToText`] implementation for the
//! Deepgram live transcription API.
//!
//! Each `open()` dials `wss://api.deepgram.com/v1/listen` with the fixed
//! session configuration as query parameters and spawns three tasks:
//!
//! - **writer** -- owns the WebSocket sink; drains a command channel of
//!   audio chunks and keepalive pings
//! - **listen** -- consumes provider frames and converts `Results`
//!   events into [`SttEvent`]s
//! - **keepalive** -- sends a `KeepAlive` control message every 5 seconds
//!   so playback-only periods (no audio flowing upstream) are not treated
//!   as an idle timeout by the provider
//!
//! [`DeepgramStream::close`] is idempotent: it cancels all three tasks
//! through a shared [`CancellationToken`] and awaits their join handles
//! before returning, so teardown is ordered rather than fire-and-forget.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

use curavox_core::gateway::{SpeechToText, SttEvent, SttStream};
use curavox_types::config::SttConfig;
use curavox_types::error::GatewayError;

/// Interval between KeepAlive control messages.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the transcript event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Deepgram streaming STT gateway.
pub struct DeepgramStt {
    api_key: SecretString,
    base_url: String,
    config: SttConfig,
}

impl DeepgramStt {
    pub fn new(api_key: SecretString, config: SttConfig) -> Self {
        Self {
            api_key,
            base_url: "wss://api.deepgram.com".to_string(),
            config,
        }
    }

    /// Override the base URL (useful for testing or proxies).
    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// The `/v1/listen` URL with the session configuration as query
    /// parameters.
    fn listen_url(&self) -> String {
        let c = &self.config;
        format!(
            "{}/v1/listen?model={}&language={}&encoding={}&sample_rate={}&channels={}&punctuate={}&interim_results={}&smart_format={}",
            self.base_url,
            c.model,
            c.language,
            c.encoding,
            c.sample_rate,
            c.channels,
            c.punctuate,
            c.interim_results,
            c.smart_format,
        )
    }
}

impl SpeechToText for DeepgramStt {
    type Stream = DeepgramStream;

    async fn open(&self) -> Result<(DeepgramStream, mpsc::Receiver<SttEvent>), GatewayError> {
        let mut request = self
            .listen_url()
            .into_client_request()
            .map_err(|err| GatewayError::Configuration(format!("invalid STT URL: {err}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key.expose_secret()))
            .map_err(|_| GatewayError::Configuration("API key is not header-safe".to_string()))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _response) = connect_async(request).await.map_err(|err| {
            GatewayError::Configuration(format!("failed to connect to Deepgram: {err}"))
        })?;
        tracing::info!(model = %self.config.model, "Deepgram live connection established");

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, mut command_rx) = mpsc::channel::<WsCommand>(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let writer_cancel = cancel.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    command = command_rx.recv() => match command {
                        Some(WsCommand::Audio(bytes)) => {
                            if ws_sink.send(Message::Binary(bytes)).await.is_err() {
                                break;
                            }
                        }
                        Some(WsCommand::KeepAlive) => {
                            let ping = r#"{"type":"KeepAlive"}"#.to_string();
                            if ws_sink.send(Message::Text(ping)).await.is_err() {
                                break;
                            }
                            tracing::trace!("keepalive sent");
                        }
                        None => break,
                    },
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        let listen_cancel = cancel.clone();
        let listen = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = listen_cancel.cancelled() => break,
                    frame = ws_stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_listen_event(&text) {
                                if events_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = events_tx.send(SttEvent::Closed).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            let _ = events_tx.send(SttEvent::Error(err.to_string())).await;
                            break;
                        }
                    },
                }
            }
        });

        let keepalive_cancel = cancel.clone();
        let keepalive_tx = command_tx.clone();
        let keepalive = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = keepalive_cancel.cancelled() => break,
                    _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {
                        if keepalive_tx.send(WsCommand::KeepAlive).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let stream = DeepgramStream {
            command_tx,
            cancel,
            tasks: Mutex::new(Some(vec![keepalive, listen, writer])),
        };
        Ok((stream, events_rx))
    }
}

/// Handle to an open Deepgram live session.
pub struct DeepgramStream {
    command_tx: mpsc::Sender<WsCommand>,
    cancel: CancellationToken,
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl SttStream for DeepgramStream {
    async fn send_audio(&self, chunk: &[u8]) -> Result<(), GatewayError> {
        self.command_tx
            .send(WsCommand::Audio(chunk.to_vec()))
            .await
            .map_err(|_| GatewayError::Transient("STT stream is closed".to_string()))
    }

    async fn close(&self) {
        // Only the first call tears down; later calls find no tasks.
        let Some(tasks) = self.tasks.lock().await.take() else {
            return;
        };
        self.cancel.cancel();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "STT task join error during teardown");
            }
        }
        tracing::debug!("Deepgram connection closed");
    }
}

#[derive(Debug)]
enum WsCommand {
    Audio(Vec<u8>),
    KeepAlive,
}

/// Parse one provider frame into an [`SttEvent`].
///
/// Only `Results` events with a non-empty transcript are surfaced;
/// metadata and speech-boundary events are ignored.
fn parse_listen_event(text: &str) -> Option<SttEvent> {
    let event: ListenEvent = serde_json::from_str(text).ok()?;
    if event.kind != "Results" {
        return None;
    }
    let transcript = event
        .channel?
        .alternatives
        .into_iter()
        .next()
        .map(|alt| alt.transcript)?;
    if transcript.is_empty() {
        return None;
    }
    Some(SttEvent::Transcript {
        text: transcript,
        is_final: event.is_final,
    })
}

#[derive(Debug, Deserialize)]
struct ListenEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    channel: Option<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
}
