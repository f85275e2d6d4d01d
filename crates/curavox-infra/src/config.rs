//! Configuration loading for Curavox.
//!
//! Reads `config.toml` and deserializes it into [`AppConfig`]. Falls back
//! to the defaults when the file is missing or malformed -- a broken
//! config file degrades to defaults rather than refusing to start.
//!
//! Provider API keys are not part of the file; they come from the
//! environment and are wrapped in [`SecretString`] so they never appear
//! in Debug output or logs.

use std::path::Path;

use secrecy::SecretString;

use curavox_types::config::AppConfig;
use curavox_types::error::GatewayError;

/// Load configuration from a `config.toml` path.
///
/// - Missing file: returns [`AppConfig::default()`].
/// - Unreadable or unparseable file: logs a warning, returns the default.
/// - Otherwise: the parsed config.
pub async fn load_config(path: &Path) -> AppConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config file at {}, using defaults", path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("failed to parse {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    }
}

/// API keys for the three provider gateways.
#[derive(Debug)]
pub struct ProviderKeys {
    pub deepgram: SecretString,
    pub groq: SecretString,
    pub elevenlabs: SecretString,
}

impl ProviderKeys {
    /// Resolve keys from the process environment
    /// (`DEEPGRAM_API_KEY`, `GROQ_API_KEY`, `ELEVENLABS_API_KEY`).
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve keys through an arbitrary lookup (injectable for tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let require = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .map(SecretString::from)
                .ok_or_else(|| {
                    GatewayError::Configuration(format!("missing environment variable {name}"))
                })
        };

        Ok(Self {
            deepgram: require("DEEPGRAM_API_KEY")?,
            groq: require("GROQ_API_KEY")?,
            elevenlabs: require("ELEVENLABS_API_KEY")?,
        })
    }
}
