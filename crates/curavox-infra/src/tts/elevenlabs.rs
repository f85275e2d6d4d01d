//! ElevenLabsTts -- concrete [`SpeechSynthesis`] implementation for the
//! ElevenLabs text-to-speech API.
//!
//! `synthesize` returns the full MP3 body for an utterance. Failures are
//! reported as [`GatewayError`] values; the orchestrator's policy for
//! them (skip the audio emission) lives at the call site.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use curavox_core::gateway::SpeechSynthesis;
use curavox_types::config::TtsConfig;
use curavox_types::error::GatewayError;

/// ElevenLabs TTS gateway.
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    config: TtsConfig,
}

impl ElevenLabsTts {
    pub fn new(api_key: SecretString, config: TtsConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| {
                GatewayError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.elevenlabs.io".to_string(),
            config,
        })
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn synthesis_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url, self.config.voice_id, self.config.output_format
        )
    }
}

impl SpeechSynthesis for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, GatewayError> {
        let body = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
        };

        let response = self
            .client
            .post(self.synthesis_url())
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Transient(format!("HTTP request failed: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::Configuration(format!(
                "provider rejected credentials: {status}"
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::Transient(format!(
                "provider returned {status}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Transient(format!("failed to read audio body: {err}")))?;
        Ok(audio.to_vec())
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: String) -> ElevenLabsTts {
        ElevenLabsTts::new(SecretString::from("el-test"), TtsConfig::default())
            .unwrap()
            .with_base_url(base_url)
    }

    #[test]
    fn test_synthesis_url_shape() {
        let url = gateway("https://api.elevenlabs.io".to_string()).synthesis_url();
        assert_eq!(
            url,
            "https://api.elevenlabs.io/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM?output_format=mp3_44100_128"
        );
    }

    #[tokio::test]
    async fn test_synthesize_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM"))
            .and(query_param("output_format", "mp3_44100_128"))
            .and(header("xi-api-key", "el-test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90, 0x00]))
            .expect(1)
            .mount(&server)
            .await;

        let tts = gateway(server.uri());
        let audio = tts.synthesize("Hello!").await.unwrap();
        assert_eq!(audio, vec![0xFF, 0xFB, 0x90, 0x00]);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["text"], "Hello!");
        assert_eq!(body["model_id"], "eleven_turbo_v2_5");
    }

    #[tokio::test]
    async fn test_synthesize_provider_failure_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = gateway(server.uri()).synthesize("Hello!").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_synthesize_auth_failure_is_configuration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = gateway(server.uri()).synthesize("Hello!").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
