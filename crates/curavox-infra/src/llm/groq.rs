//! GroqLlm -- concrete [`LanguageModel`] implementation over the Groq
//! OpenAI-compatible chat completions API.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and only exposed
//! when constructing the Authorization header.
//!
//! The summary path instructs the provider to return a single
//! well-formed JSON record. Output that cannot be parsed into
//! [`MedicalSummary`] (with or without Markdown code fences) resolves to
//! [`MedicalSummary::fallback`] rather than an error, so callers always
//! receive the fixed record shape.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use curavox_core::gateway::LanguageModel;
use curavox_types::config::LlmConfig;
use curavox_types::error::GatewayError;
use curavox_types::message::{ConversationTurn, Role};
use curavox_types::summary::MedicalSummary;

/// Persona prepended as the system message for every conversational reply.
const SYSTEM_PERSONA: &str = r#"You are a warm, friendly medical assistant having a natural conversation with a patient. You're like a caring friend who happens to know about health.

PERSONALITY & TONE:
- Be expressive and reactive! Use natural expressions like:
  "Oh no, that sounds rough!", "Ouch, I can imagine that hurts!", "Gotcha!", "Hmm, interesting...", "Oh I see!", "Ah, that makes sense!", "Wow, that must be tough!", "Yikes!", "Oh dear!"
- Sound like a real person, not a robot asking checklist questions
- Show genuine empathy and concern
- React emotionally to what they share before moving on

CONVERSATION STYLE:
- DON'T ask questions every single time - sometimes just acknowledge and sympathize
- Mix it up: sometimes ask, sometimes just respond supportively
- Keep it SHORT - 1-2 sentences max, this is voice chat
- Be conversational, not clinical
- Avoid medical jargon - use everyday words

IMPORTANT RULES:
- NEVER diagnose or prescribe medication
- For emergencies (chest pain, breathing trouble, severe bleeding, stroke signs) - tell them to call 911 immediately
- You're gathering info to help them, not interrogating them
- If they seem tired of questions, just be supportive instead

Remember: You're having a friendly chat, not conducting a formal interview!"#;

/// Instruction for the end-of-session structured summary.
const SUMMARY_INSTRUCTION: &str = r#"Based on this patient conversation, generate a structured medical summary.

Return ONLY valid JSON in this exact format (no markdown, no extra text):
{
    "chief_complaint": "Brief 1-line description of main issue",
    "history_of_present_illness": "Detailed narrative paragraph of symptoms, timeline, and characteristics",
    "relevant_history": ["Point 1", "Point 2"],
    "assessment": "Clinical impression of likely condition",
    "recommendations": ["Recommendation 1", "Recommendation 2"]
}

Only include information that was actually mentioned in the conversation. Be concise but thorough."#;

/// Sampling parameters for summary generation.
const SUMMARY_MAX_TOKENS: u32 = 1000;
const SUMMARY_TEMPERATURE: f64 = 0.3;

/// Groq LLM gateway.
pub struct GroqLlm {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl GroqLlm {
    pub fn new(api_key: SecretString, config: LlmConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| {
                GatewayError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.groq.com".to_string(),
            config,
        })
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, GatewayError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens,
            temperature,
        };
        let url = format!("{}/openai/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
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

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Transient(format!("undecodable completion: {err}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Transient("completion had no choices".to_string()))
    }
}

impl LanguageModel for GroqLlm {
    async fn respond(&self, window: &[ConversationTurn]) -> Result<String, GatewayError> {
        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(ChatMessage::system(SYSTEM_PERSONA));
        messages.extend(window.iter().map(ChatMessage::from_turn));

        self.complete(messages, self.config.max_tokens, self.config.temperature)
            .await
    }

    async fn summarize(
        &self,
        history: &[ConversationTurn],
    ) -> Result<MedicalSummary, GatewayError> {
        let messages = vec![
            ChatMessage::system(SUMMARY_INSTRUCTION),
            ChatMessage {
                role: "user",
                content: format!("Patient Conversation:\n\n{}", format_conversation(history)),
            },
        ];

        let raw = self
            .complete(messages, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE)
            .await?;

        match parse_summary(&raw) {
            Some(summary) => Ok(summary),
            None => {
                tracing::warn!("summary output was not parseable, using fallback record");
                Ok(MedicalSummary::fallback())
            }
        }
    }
}

/// Render the conversation as labelled plain text for the summary prompt.
fn format_conversation(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            let label = match turn.role {
                Role::User => "Patient",
                Role::Assistant => "Medical Assistant",
            };
            format!("{label}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse the provider's summary output, tolerating Markdown code fences.
fn parse_summary(raw: &str) -> Option<MedicalSummary> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).ok()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: content.to_string(),
        }
    }

    fn from_turn(turn: &ConversationTurn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}
