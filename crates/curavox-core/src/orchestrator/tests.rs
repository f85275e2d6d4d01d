use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use curavox_types::error::GatewayError;
use curavox_types::message::{ConversationTurn, Role};
use curavox_types::protocol::{ServerMessage, Status};
use curavox_types::summary::MedicalSummary;

use super::*;
use crate::gateway::{SpeechSynthesis, SpeechToText, SttEvent, SttStream};

// ---------------------------------------------------------------------------
// Gateway test doubles
// ---------------------------------------------------------------------------

struct MockLlm {
    reply: String,
    fail_respond: bool,
    respond_delay: Duration,
    respond_windows: Mutex<Vec<Vec<ConversationTurn>>>,
    summarize_lens: Mutex<Vec<usize>>,
}

impl MockLlm {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_respond: false,
            respond_delay: Duration::ZERO,
            respond_windows: Mutex::new(Vec::new()),
            summarize_lens: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail_respond: true,
            ..Self::new("")
        }
    }

    fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            respond_delay: delay,
            ..Self::new(reply)
        }
    }

    fn respond_count(&self) -> usize {
        self.respond_windows.lock().unwrap().len()
    }
}

impl LanguageModel for MockLlm {
    async fn respond(&self, window: &[ConversationTurn]) -> Result<String, GatewayError> {
        if !self.respond_delay.is_zero() {
            tokio::time::sleep(self.respond_delay).await;
        }
        self.respond_windows.lock().unwrap().push(window.to_vec());
        if self.fail_respond {
            Err(GatewayError::Transient("provider unavailable".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }

    async fn summarize(
        &self,
        history: &[ConversationTurn],
    ) -> Result<MedicalSummary, GatewayError> {
        self.summarize_lens.lock().unwrap().push(history.len());
        Ok(MedicalSummary {
            chief_complaint: "Headache".to_string(),
            history_of_present_illness: "Reported a headache.".to_string(),
            relevant_history: Vec::new(),
            assessment: "Likely tension headache".to_string(),
            recommendations: vec!["Rest".to_string()],
        })
    }
}

struct MockTts {
    audio: Vec<u8>,
    fail: bool,
    requests: Mutex<Vec<String>>,
}

impl MockTts {
    fn with_audio(audio: Vec<u8>) -> Self {
        Self {
            audio,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn silent() -> Self {
        Self::with_audio(Vec::new())
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_audio(Vec::new())
        }
    }
}

impl SpeechSynthesis for MockTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, GatewayError> {
        self.requests.lock().unwrap().push(text.to_string());
        if self.fail {
            Err(GatewayError::Transient("synthesis failed".to_string()))
        } else {
            Ok(self.audio.clone())
        }
    }
}

struct MockSttStream {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl SttStream for MockSttStream {
    async fn send_audio(&self, chunk: &[u8]) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push(chunk.to_vec());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockStt {
    events: Mutex<Option<mpsc::Receiver<SttEvent>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
    fail_open: bool,
}

impl MockStt {
    fn new(events: mpsc::Receiver<SttEvent>) -> Self {
        Self {
            events: Mutex::new(Some(events)),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            fail_open: false,
        }
    }

    fn failing_open() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self {
            fail_open: true,
            ..Self::new(rx)
        }
    }
}

impl SpeechToText for MockStt {
    type Stream = MockSttStream;

    async fn open(&self) -> Result<(MockSttStream, mpsc::Receiver<SttEvent>), GatewayError> {
        if self.fail_open {
            return Err(GatewayError::Configuration("missing API key".to_string()));
        }
        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .expect("open called more than once");
        Ok((
            MockSttStream {
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            },
            events,
        ))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn next(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for server message")
        .expect("outbound channel closed unexpectedly")
}

fn assert_status(msg: ServerMessage, expected: Status) {
    match msg {
        ServerMessage::Status { status } => assert_eq!(status, expected),
        other => panic!("expected status {expected:?}, got {other:?}"),
    }
}

/// Drain messages until `status: listening` arrives (end of a turn).
async fn drain_turn(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    loop {
        let msg = next(rx).await;
        let done = matches!(
            msg,
            ServerMessage::Status {
                status: Status::Listening
            }
        );
        messages.push(msg);
        if done {
            return messages;
        }
    }
}

async fn wait_for_turn_clear(state: &SessionState) {
    for _ in 0..100 {
        if !state.turn_in_flight() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("turn flag never cleared");
}

fn test_engine(
    llm: Arc<MockLlm>,
    tts: Arc<MockTts>,
) -> (
    TurnEngine<MockLlm, MockTts>,
    Arc<SessionRegistry>,
    mpsc::Receiver<ServerMessage>,
) {
    let registry = Arc::new(SessionRegistry::new());
    let session_id = registry.create();
    let (outbound, rx) = mpsc::channel(64);
    let engine = TurnEngine {
        session_id,
        registry: Arc::clone(&registry),
        llm,
        tts,
        outbound,
        state: SessionState::new(),
    };
    (engine, registry, rx)
}

// ---------------------------------------------------------------------------
// Conversation window
// ---------------------------------------------------------------------------

#[test]
fn test_window_truncates_to_last_ten() {
    let turns: Vec<ConversationTurn> = (1..=15)
        .map(|n| ConversationTurn {
            role: if n % 2 == 1 { Role::User } else { Role::Assistant },
            content: format!("m{n}"),
        })
        .collect();

    let window = conversation_window(&turns);
    assert_eq!(window.len(), 10);
    assert_eq!(window[0].content, "m6");
    assert_eq!(window[9].content, "m15");
}

#[test]
fn test_window_shorter_history_unchanged() {
    let turns: Vec<ConversationTurn> = (1..=4)
        .map(|n| ConversationTurn {
            role: Role::User,
            content: format!("m{n}"),
        })
        .collect();
    assert_eq!(conversation_window(&turns).len(), 4);
    assert!(conversation_window(&[]).is_empty());
}

// ---------------------------------------------------------------------------
// Turn engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_flight_dedupes_overlapping_finals() {
    let llm = Arc::new(MockLlm::slow(
        "Oh no, that sounds rough!",
        Duration::from_millis(50),
    ));
    let tts = Arc::new(MockTts::with_audio(vec![1, 2, 3]));
    let (engine, _registry, mut rx) = test_engine(Arc::clone(&llm), tts);

    let started: usize = (0..8)
        .filter(|_| engine.try_begin_turn("I have a headache"))
        .count();
    assert_eq!(started, 1);

    let messages = drain_turn(&mut rx).await;
    assert_eq!(llm.respond_count(), 1);
    let responses = messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::Response { .. }))
        .count();
    let audio = messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::Audio { .. }))
        .count();
    assert_eq!(responses, 1);
    assert_eq!(audio, 1);

    // The flag is clear afterward, so a subsequent legitimate final
    // transcript is processed.
    wait_for_turn_clear(&engine.state).await;
    assert!(engine.try_begin_turn("and it will not go away"));
    drain_turn(&mut rx).await;
    assert_eq!(llm.respond_count(), 2);
}

#[tokio::test]
async fn test_turn_window_is_truncated() {
    let llm = Arc::new(MockLlm::new("Gotcha."));
    let tts = Arc::new(MockTts::with_audio(vec![9]));
    let (engine, registry, mut rx) = test_engine(Arc::clone(&llm), tts);

    for n in 1..=15 {
        let role = if n % 2 == 1 { Role::User } else { Role::Assistant };
        registry.add_message(engine.session_id, role, &format!("m{n}"));
    }

    assert!(engine.try_begin_turn("m16"));
    drain_turn(&mut rx).await;

    let windows = llm.respond_windows.lock().unwrap();
    assert_eq!(windows.len(), 1);
    // History was 16 messages at completion time; the window holds the
    // last 10, ending in the transcript that started the turn.
    assert_eq!(windows[0].len(), 10);
    assert_eq!(windows[0][0].content, "m7");
    assert_eq!(windows[0][9].content, "m16");

    // The registry keeps the full history regardless.
    assert_eq!(registry.get_conversation(engine.session_id).len(), 17);
}

#[tokio::test]
async fn test_failed_completion_substitutes_apology() {
    let llm = Arc::new(MockLlm::failing());
    let tts = Arc::new(MockTts::with_audio(vec![4]));
    let (engine, registry, mut rx) = test_engine(llm, tts);

    assert!(engine.try_begin_turn("hello?"));
    let messages = drain_turn(&mut rx).await;

    let response = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::Response { text } => Some(text.clone()),
            _ => None,
        })
        .expect("no response message");
    assert_eq!(response, APOLOGY_TEXT);

    // The apology is recorded in history like any assistant reply.
    let conversation = registry.get_conversation(engine.session_id);
    assert_eq!(conversation.last().unwrap().content, APOLOGY_TEXT);

    // A failed turn never leaks the in-flight flag.
    wait_for_turn_clear(&engine.state).await;
    assert!(engine.try_begin_turn("are you there?"));
}

#[tokio::test]
async fn test_empty_synthesis_skips_audio_emission() {
    let llm = Arc::new(MockLlm::new("Hmm, interesting."));
    let tts = Arc::new(MockTts::silent());
    let (engine, _registry, mut rx) = test_engine(llm, tts);

    assert!(engine.try_begin_turn("my arm itches"));
    let messages = drain_turn(&mut rx).await;

    assert!(
        messages
            .iter()
            .all(|m| !matches!(m, ServerMessage::Audio { .. })),
        "empty synthesis output must skip the audio emission"
    );
    assert!(
        messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Response { .. }))
    );
}

#[tokio::test]
async fn test_failed_synthesis_skips_audio_emission() {
    let llm = Arc::new(MockLlm::new("Ouch!"));
    let tts = Arc::new(MockTts::failing());
    let (engine, _registry, mut rx) = test_engine(llm, tts);

    assert!(engine.try_begin_turn("I stubbed my toe"));
    let messages = drain_turn(&mut rx).await;
    assert!(
        messages
            .iter()
            .all(|m| !matches!(m, ServerMessage::Audio { .. }))
    );
    wait_for_turn_clear(&engine.state).await;
}

// ---------------------------------------------------------------------------
// Full connection runs
// ---------------------------------------------------------------------------

struct Harness {
    registry: Arc<SessionRegistry>,
    llm: Arc<MockLlm>,
    stt_sent: Arc<Mutex<Vec<Vec<u8>>>>,
    stt_closed: Arc<AtomicBool>,
    events_tx: mpsc::Sender<SttEvent>,
    in_tx: mpsc::Sender<ClientFrame>,
    out_rx: mpsc::Receiver<ServerMessage>,
    run: tokio::task::JoinHandle<()>,
}

fn spawn_connection(llm: MockLlm, tts: MockTts) -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let (events_tx, events_rx) = mpsc::channel(16);
    let stt = Arc::new(MockStt::new(events_rx));
    let stt_sent = Arc::clone(&stt.sent);
    let stt_closed = Arc::clone(&stt.closed);
    let llm = Arc::new(llm);
    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);

    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        stt,
        Arc::clone(&llm),
        Arc::new(tts),
        out_tx,
    );
    let run = tokio::spawn(orchestrator.run(in_rx));

    Harness {
        registry,
        llm,
        stt_sent,
        stt_closed,
        events_tx,
        in_tx,
        out_rx,
        run,
    }
}

impl Harness {
    /// Consume the greeting sequence: speaking, greeting audio, listening.
    async fn expect_greeting(&mut self) {
        assert_status(next(&mut self.out_rx).await, Status::Speaking);
        assert!(matches!(
            next(&mut self.out_rx).await,
            ServerMessage::Audio { .. }
        ));
        assert_status(next(&mut self.out_rx).await, Status::Listening);
    }
}

#[tokio::test]
async fn test_end_to_end_conversation() {
    let mut h = spawn_connection(
        MockLlm::new("Oh no, headaches are the worst!"),
        MockTts::with_audio(vec![0xFF, 0xFB]),
    );
    h.expect_greeting().await;

    // Three non-empty audio frames, plus a zero-length one that must be
    // dropped without forwarding.
    for _ in 0..3 {
        h.in_tx
            .send(ClientFrame::Binary(vec![0u8; 320]))
            .await
            .unwrap();
    }
    h.in_tx.send(ClientFrame::Binary(Vec::new())).await.unwrap();

    // Interim, then final transcript.
    h.events_tx
        .send(SttEvent::Transcript {
            text: "I have".to_string(),
            is_final: false,
        })
        .await
        .unwrap();
    h.events_tx
        .send(SttEvent::Transcript {
            text: "I have a headache".to_string(),
            is_final: true,
        })
        .await
        .unwrap();

    match next(&mut h.out_rx).await {
        ServerMessage::Transcript { text, is_final } => {
            assert_eq!(text, "I have");
            assert!(!is_final);
        }
        other => panic!("expected interim transcript, got {other:?}"),
    }
    match next(&mut h.out_rx).await {
        ServerMessage::Transcript { text, is_final } => {
            assert_eq!(text, "I have a headache");
            assert!(is_final);
        }
        other => panic!("expected final transcript, got {other:?}"),
    }

    assert_status(next(&mut h.out_rx).await, Status::Thinking);
    match next(&mut h.out_rx).await {
        ServerMessage::Response { text } => assert_eq!(text, "Oh no, headaches are the worst!"),
        other => panic!("expected response, got {other:?}"),
    }
    assert_status(next(&mut h.out_rx).await, Status::Speaking);
    assert!(matches!(
        next(&mut h.out_rx).await,
        ServerMessage::Audio { .. }
    ));
    assert_status(next(&mut h.out_rx).await, Status::Listening);

    // End the session.
    h.in_tx
        .send(ClientFrame::Text(r#"{"type":"end_session"}"#.to_string()))
        .await
        .unwrap();

    assert_status(next(&mut h.out_rx).await, Status::Thinking);
    assert!(matches!(
        next(&mut h.out_rx).await,
        ServerMessage::Audio { .. }
    ));
    match next(&mut h.out_rx).await {
        ServerMessage::Summary { data } => assert_eq!(data.chief_complaint, "Headache"),
        other => panic!("expected summary, got {other:?}"),
    }
    assert_status(next(&mut h.out_rx).await, Status::Idle);

    h.run.await.unwrap();

    // Terminal close: no further messages, STT torn down, session gone.
    assert!(h.out_rx.recv().await.is_none());
    assert!(h.stt_closed.load(Ordering::SeqCst));
    assert!(h.registry.is_empty());

    // Exactly the three non-empty frames were forwarded.
    assert_eq!(h.stt_sent.lock().unwrap().len(), 3);

    // The summary saw the full history: greeting + user + assistant.
    assert_eq!(h.llm.summarize_lens.lock().unwrap()[0], 3);
}

#[tokio::test]
async fn test_keep_alive_is_ignored() {
    let mut h = spawn_connection(MockLlm::new("ok"), MockTts::with_audio(vec![1]));
    h.expect_greeting().await;

    h.in_tx
        .send(ClientFrame::Text(r#"{"type":"keep_alive"}"#.to_string()))
        .await
        .unwrap();
    h.in_tx
        .send(ClientFrame::Text(r#"{"type":"end_session"}"#.to_string()))
        .await
        .unwrap();

    // keep_alive produced nothing; the next message is the ending status.
    assert_status(next(&mut h.out_rx).await, Status::Thinking);
}

#[tokio::test]
async fn test_malformed_frame_is_recoverable() {
    let mut h = spawn_connection(MockLlm::new("ok"), MockTts::with_audio(vec![1]));
    h.expect_greeting().await;

    h.in_tx
        .send(ClientFrame::Text("{definitely not json".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        next(&mut h.out_rx).await,
        ServerMessage::Error { .. }
    ));

    // The connection keeps serving and can still end cleanly.
    h.in_tx
        .send(ClientFrame::Text(r#"{"type":"end_session"}"#.to_string()))
        .await
        .unwrap();
    assert_status(next(&mut h.out_rx).await, Status::Thinking);
    h.run.await.unwrap();
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_invalid_base64_audio_is_recoverable() {
    let mut h = spawn_connection(MockLlm::new("ok"), MockTts::with_audio(vec![1]));
    h.expect_greeting().await;

    h.in_tx
        .send(ClientFrame::Text(
            r#"{"type":"audio","data":"!!! not base64 !!!"}"#.to_string(),
        ))
        .await
        .unwrap();
    assert!(matches!(
        next(&mut h.out_rx).await,
        ServerMessage::Error { .. }
    ));

    // Valid base64 audio still flows afterwards.
    h.in_tx
        .send(ClientFrame::Text(
            r#"{"type":"audio","data":"AAECAwQF"}"#.to_string(),
        ))
        .await
        .unwrap();
    h.in_tx
        .send(ClientFrame::Text(r#"{"type":"end_session"}"#.to_string()))
        .await
        .unwrap();
    h.run.await.unwrap();
    assert_eq!(h.stt_sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transport_close_tears_down() {
    let mut h = spawn_connection(MockLlm::new("ok"), MockTts::with_audio(vec![1]));
    h.expect_greeting().await;

    h.in_tx.send(ClientFrame::Closed).await.unwrap();
    h.run.await.unwrap();

    assert!(h.stt_closed.load(Ordering::SeqCst));
    assert!(h.registry.is_empty());
    // No goodbye, no summary on transport loss.
    assert!(h.out_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_stt_open_failure_aborts_connection() {
    let registry = Arc::new(SessionRegistry::new());
    let (out_tx, mut out_rx) = mpsc::channel(8);
    let (_in_tx, in_rx) = mpsc::channel(8);

    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        Arc::new(MockStt::failing_open()),
        Arc::new(MockLlm::new("ok")),
        Arc::new(MockTts::with_audio(vec![1])),
        out_tx,
    );
    orchestrator.run(in_rx).await;

    assert!(matches!(
        next(&mut out_rx).await,
        ServerMessage::Error { .. }
    ));
    assert!(out_rx.recv().await.is_none());
    assert!(registry.is_empty());
}
