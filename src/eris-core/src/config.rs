//! Configuration module for loading TOML config files.
//!
//! Every section has defaults, so an empty or partial file is valid. Secrets
//! never live in the file; see [`Secrets::from_env`].

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::debate_format::PhaseTimings;
use crate::error::DebateError;
use crate::participant::Side;
use crate::retry::RetryPolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub voices: VoicesConfig,
    pub debate: DebateSettings,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub search: SearchConfig,
    pub prompts: PromptsConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: PathBuf::from("eris.db"),
        }
    }
}

/// OpenAI-compatible chat and vector store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_base: String,
    /// Default model for AI debaters.
    pub model: String,
    /// Model used to judge debates and give speech feedback.
    pub feedback_model: String,
    /// Hosted vector store holding the evidence corpus, if any.
    pub vector_store_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            feedback_model: "gpt-4o-mini".to_string(),
            vector_store_id: None,
            request_timeout_secs: 120,
        }
    }
}

/// ElevenLabs TTS/STT settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    pub api_base: String,
    pub tts_model: String,
    pub stt_model: String,
    pub sample_rate: u32,
    /// Longest text sent in a single synthesis request.
    pub max_chunk_chars: usize,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io".to_string(),
            tts_model: "eleven_turbo_v2_5".to_string(),
            stt_model: "scribe_v1".to_string(),
            sample_rate: 24_000,
            max_chunk_chars: 2_500,
        }
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub pro_voice: String,
    pub con_voice: String,
    pub moderator_voice: String,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            pro_voice: "21m00Tcm4TlvDq8ikWAM".to_string(),
            con_voice: "pNInz6obpgDQGcFmaJgB".to_string(),
            moderator_voice: "EXAVITQu4vr4xnSDxMaL".to_string(),
        }
    }
}

/// Round settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    pub format: String,
    pub timings: PhaseTimings,
    /// Extra seconds a turn may run over before the clock moves on.
    pub grace_secs: u32,
    /// Generate the AI's speech as soon as its turn comes up.
    pub auto_ai_turns: bool,
    pub ai_name: String,
    /// How long events of a finished debate stay available to pollers.
    pub event_retention_secs: u64,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            format: "public_forum".to_string(),
            timings: PhaseTimings::default(),
            grace_secs: 15,
            auto_ai_turns: true,
            ai_name: "Eris".to_string(),
            event_retention_secs: 600,
        }
    }
}

/// Backoff for calls to hosted services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Per-user request limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 60,
            window_secs: 60,
        }
    }
}

/// Evidence ingestion and search.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub chunk_chars: usize,
    pub chunk_overlap: usize,
    /// How many keyword candidates to pull from the store before ranking.
    pub candidate_limit: usize,
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 1_200,
            chunk_overlap: 150,
            candidate_limit: 200,
            default_limit: 10,
        }
    }
}

/// System prompt overrides. Empty templates fall back to the format's own
/// prompt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub pro_prompt: String,
    pub con_prompt: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.as_ref().display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from string content.
    pub fn parse(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Get the configured system prompt for a side, with placeholders
    /// replaced. `None` when no override is configured.
    pub fn get_prompt(
        &self,
        side: Side,
        name: &str,
        topic: &str,
        opponent_name: &str,
    ) -> Option<String> {
        let template = match side {
            Side::Pro => &self.prompts.pro_prompt,
            Side::Con => &self.prompts.con_prompt,
        };

        if template.trim().is_empty() {
            return None;
        }

        Some(
            template
                .replace("{name}", name)
                .replace("{topic}", topic)
                .replace("{opponent_name}", opponent_name)
                .replace("{side}", side.display_name()),
        )
    }

    /// Get voice ID for a side.
    pub fn get_voice(&self, side: Side) -> &str {
        match side {
            Side::Pro => &self.voices.pro_voice,
            Side::Con => &self.voices.con_voice,
        }
    }
}

/// Credentials for hosted services, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: String,
    /// Overrides `openai.api_base` when set.
    pub openai_api_base: Option<String>,
    pub elevenlabs_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let openai_api_base = env::var("OPENAI_API_BASE")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .ok();

        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
            tracing::warn!("OPENAI_API_KEY not set; API calls may fail");
            String::new()
        });

        let elevenlabs_api_key = env::var("ELEVENLABS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self {
            openai_api_key,
            openai_api_base,
            elevenlabs_api_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.debate.timings.constructive_secs, 240);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.openai.vector_store_id.is_none());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 9000

            [debate.timings]
            crossfire_secs = 30

            [openai]
            vector_store_id = "vs_123"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.debate.timings.crossfire_secs, 30);
        assert_eq!(config.debate.timings.rebuttal_secs, 240);
        assert_eq!(config.openai.vector_store_id.as_deref(), Some("vs_123"));
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(matches!(
            Config::parse("[server]\nport = \"eighty\""),
            Err(DebateError::ConfigError(_))
        ));
    }

    #[test]
    fn test_prompt_placeholders() {
        let mut config = Config::default();
        assert!(config.get_prompt(Side::Pro, "A", "T", "B").is_none());

        config.prompts.pro_prompt = "{name} argues {side} on {topic} against {opponent_name}".into();
        assert_eq!(
            config.get_prompt(Side::Pro, "Eris", "UBI", "Sam").unwrap(),
            "Eris argues PRO on UBI against Sam"
        );
    }

    #[test]
    fn test_voice_per_side() {
        let config = Config::default();
        assert_eq!(config.get_voice(Side::Pro), config.voices.pro_voice);
        assert_eq!(config.get_voice(Side::Con), config.voices.con_voice);
    }
}
