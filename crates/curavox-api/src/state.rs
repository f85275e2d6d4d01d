//! Application state wiring the gateways and registry together.
//!
//! AppState pins the generic orchestrator to the concrete provider
//! implementations. Gateways are constructed once here and injected into
//! each connection's orchestrator -- there are no module-level
//! singletons, so tests substitute doubles freely.

use std::sync::Arc;

use curavox_core::orchestrator::Orchestrator;
use curavox_core::registry::SessionRegistry;
use curavox_infra::config::ProviderKeys;
use curavox_infra::llm::GroqLlm;
use curavox_infra::stt::DeepgramStt;
use curavox_infra::tts::ElevenLabsTts;
use curavox_types::config::AppConfig;

/// The orchestrator type pinned to the concrete provider gateways.
pub type ConcreteOrchestrator = Orchestrator<DeepgramStt, GroqLlm, ElevenLabsTts>;

/// Shared application state handed to every connection handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub stt: Arc<DeepgramStt>,
    pub llm: Arc<GroqLlm>,
    pub tts: Arc<ElevenLabsTts>,
}

impl AppState {
    /// Build the application state: resolve API keys from the
    /// environment and construct the provider gateways.
    pub fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let keys = ProviderKeys::from_env()?;

        let stt = DeepgramStt::new(keys.deepgram, config.stt.clone());
        let llm = GroqLlm::new(keys.groq, config.llm.clone())?;
        let tts = ElevenLabsTts::new(keys.elevenlabs, config.tts.clone())?;

        Ok(Self {
            registry: Arc::new(SessionRegistry::new()),
            stt: Arc::new(stt),
            llm: Arc::new(llm),
            tts: Arc::new(tts),
        })
    }
}
