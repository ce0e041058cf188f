use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

/// Default persona and language policy sent as the system instruction
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Janmitra, a friendly voice assistant for \
rural citizens of India. You help people understand government schemes such as PM-Kisan, \
bank loans, and pensions. Detect the language or dialect the caller speaks and reply in \
that same language. Keep answers short, simple, and respectful.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub http: HttpConfig,
    pub agent: AgentConfig,
}

/// Connection and persona settings for the hosted speech session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint (must start with ws:// or wss://)
    pub endpoint: String,

    /// API key; falls back to the GEMINI_API_KEY environment variable
    pub api_key: String,

    /// Model identifier, passed through opaquely
    pub model: String,

    /// Prebuilt voice name for synthesized replies
    pub voice: String,

    pub temperature: f32,

    /// Persona and language policy, passed through opaquely
    pub system_instruction: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            api_key: String::new(),
            model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Zephyr".to_string(),
            temperature: 0.8,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture rate expected by the session
    pub input_sample_rate: u32,

    /// Rate of inbound audio fragments
    pub output_sample_rate: u32,

    /// Samples per capture tick
    pub chunk_samples: usize,

    /// Capture channel count (1 = mono)
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            chunk_samples: 4096,
            channels: 1,
        }
    }
}

/// On-disk WAV recording of both call directions (debugging aid)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub dir: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "recordings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Headless deployment mode settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Session-start attempts before giving up
    pub max_start_attempts: u32,

    /// Voice for the deployed agent (the interactive call keeps live.voice)
    pub voice: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_start_attempts: 3,
            voice: "Charon".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus JANMITRA_* environment
    /// overrides (e.g. JANMITRA_LIVE__API_KEY)
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("JANMITRA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut cfg: Self = settings.try_deserialize()?;

        // Deployments usually provide the credential as a plain variable
        if cfg.live.api_key.is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                cfg.live.api_key = key;
            }
        }

        Ok(cfg)
    }

    /// Check startup requirements
    ///
    /// A missing credential or a malformed endpoint is fatal for the call
    /// attempt; a key that merely looks unusual only warns.
    pub fn validate(&self) -> Result<()> {
        if self.live.api_key.is_empty() {
            anyhow::bail!(
                "Missing API key: set live.api_key or the GEMINI_API_KEY environment variable"
            );
        }

        if !self.live.endpoint.starts_with("ws://") && !self.live.endpoint.starts_with("wss://") {
            anyhow::bail!(
                "Live endpoint must start with ws:// or wss://, got: {}",
                self.live.endpoint
            );
        }

        if !self.live.api_key.starts_with("AIza") {
            warn!("API key does not look like a Google AI key (expected AIza prefix)");
        }

        Ok(())
    }
}
