//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{admission, audio, conversation, endpoints, llm, stt, tts, websocket};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Pipeline coordinator limits
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Conversation context cache bounds
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Streaming session settings
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Speech recognition backend
    #[serde(default)]
    pub stt: SttConfig,

    /// Text generation backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech synthesis backend
    #[serde(default)]
    pub tts: TtsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_orchestrator()?;
        self.validate_conversation()?;
        self.validate_speech()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port must be non-zero"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(invalid("server.max_upload_bytes", "Must be greater than 0"));
        }
        Ok(())
    }

    fn validate_orchestrator(&self) -> Result<(), ConfigError> {
        let orch = &self.orchestrator;

        if orch.max_concurrent == 0 {
            return Err(invalid("orchestrator.max_concurrent", "Must be greater than 0"));
        }

        if orch.min_audio_duration <= 0.0 {
            return Err(invalid(
                "orchestrator.min_audio_duration",
                format!("Must be positive, got {}", orch.min_audio_duration),
            ));
        }

        if orch.max_audio_duration <= orch.min_audio_duration {
            return Err(invalid(
                "orchestrator.max_audio_duration",
                format!(
                    "Must exceed min_audio_duration ({} <= {})",
                    orch.max_audio_duration, orch.min_audio_duration
                ),
            ));
        }

        if orch.supported_formats.is_empty() {
            return Err(invalid("orchestrator.supported_formats", "At least one format required"));
        }

        if orch.run_timeout_secs == Some(0) {
            return Err(invalid("orchestrator.run_timeout_secs", "Must be greater than 0 when set"));
        }

        Ok(())
    }

    fn validate_conversation(&self) -> Result<(), ConfigError> {
        if self.conversation.max_turns == 0 {
            return Err(invalid("conversation.max_turns", "Must be greater than 0"));
        }
        if self.conversation.max_conversations == 0 {
            return Err(invalid("conversation.max_conversations", "Must be greater than 0"));
        }
        if self.websocket.heartbeat_interval_secs == 0 {
            return Err(invalid("websocket.heartbeat_interval_secs", "Must be greater than 0"));
        }
        Ok(())
    }

    fn validate_speech(&self) -> Result<(), ConfigError> {
        if self.stt.max_concurrent == 0 {
            return Err(invalid("stt.max_concurrent", "Must be greater than 0"));
        }
        if self.llm.max_concurrent == 0 {
            return Err(invalid("llm.max_concurrent", "Must be greater than 0"));
        }
        if self.tts.max_concurrent == 0 {
            return Err(invalid("tts.max_concurrent", "Must be greater than 0"));
        }

        let t = &self.tts;
        if !(t.min_speed > 0.0 && t.min_speed <= t.default_speed && t.default_speed <= t.max_speed) {
            return Err(invalid(
                "tts.default_speed",
                format!(
                    "Speeds must satisfy 0 < min <= default <= max, got {} / {} / {}",
                    t.min_speed, t.default_speed, t.max_speed
                ),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(
                "llm.temperature",
                format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS restrictions (disabled = permissive)
    #[serde(default)]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: false,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Pipeline coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrent pipeline runs
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent: usize,

    /// Permit wait before rejecting with TOO_MANY_REQUESTS
    #[serde(default = "default_admission_grace_ms")]
    pub admission_grace_ms: u64,

    /// Retry hint attached to admission rejections
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    #[serde(default = "default_min_audio_duration")]
    pub min_audio_duration: f64,

    #[serde(default = "default_max_audio_duration")]
    pub max_audio_duration: f64,

    /// Optional deadline for a whole run; unset means no deadline
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    /// Accepted upload extensions
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,
}

fn default_max_concurrent_runs() -> usize {
    admission::MAX_CONCURRENT_RUNS
}
fn default_admission_grace_ms() -> u64 {
    admission::GRACE_PERIOD_MS
}
fn default_retry_after_secs() -> u64 {
    admission::RETRY_AFTER_SECS
}
fn default_min_audio_duration() -> f64 {
    audio::MIN_DURATION_SECS
}
fn default_max_audio_duration() -> f64 {
    audio::MAX_DURATION_SECS
}
fn default_supported_formats() -> Vec<String> {
    audio::SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect()
}

impl OrchestratorConfig {
    pub fn admission_grace(&self) -> Duration {
        Duration::from_millis(self.admission_grace_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent_runs(),
            admission_grace_ms: default_admission_grace_ms(),
            retry_after_secs: default_retry_after_secs(),
            min_audio_duration: default_min_audio_duration(),
            max_audio_duration: default_max_audio_duration(),
            run_timeout_secs: None,
            supported_formats: default_supported_formats(),
        }
    }
}

/// Conversation context cache bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turns kept per conversation
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Conversations kept in memory
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,

    /// Idle lifetime of a conversation
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

fn default_max_turns() -> usize {
    conversation::MAX_TURNS
}
fn default_max_conversations() -> usize {
    conversation::MAX_CONVERSATIONS
}
fn default_ttl_minutes() -> u64 {
    conversation::TTL_MINUTES
}

impl ConversationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_conversations: default_max_conversations(),
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// Streaming session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Longest utterance accepted over a stream
    #[serde(default = "default_max_stream_secs")]
    pub max_stream_secs: u64,

    /// Bound on buffered PCM per connection
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

fn default_heartbeat_interval_secs() -> u64 {
    websocket::HEARTBEAT_INTERVAL_SECS
}
fn default_max_stream_secs() -> u64 {
    websocket::MAX_STREAM_SECS
}
fn default_max_buffer_bytes() -> usize {
    websocket::MAX_BUFFER_BYTES
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_stream_secs: default_max_stream_secs(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

/// Speech recognition backend (OpenAI-compatible transcription API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    #[serde(default = "default_stt_model")]
    pub model: String,

    /// ISO-639-1 hint; autodetect when unset
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default = "default_stt_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_openai_endpoint() -> String {
    endpoints::OPENAI_DEFAULT.to_string()
}
fn default_api_key() -> String {
    std::env::var("OPENAI_API_KEY").unwrap_or_default()
}
fn default_stt_model() -> String {
    "whisper-1".to_string()
}
fn default_stt_max_concurrent() -> usize {
    stt::MAX_CONCURRENT
}
fn default_speech_timeout_secs() -> u64 {
    60
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            api_key: default_api_key(),
            model: default_stt_model(),
            language: None,
            max_concurrent: default_stt_max_concurrent(),
            timeout_secs: default_speech_timeout_secs(),
        }
    }
}

/// Text generation backend (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_llm_max_concurrent")]
    pub max_concurrent: usize,

    /// Longest accepted user message, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    llm::MAX_TOKENS
}
fn default_temperature() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    llm::DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_llm_max_concurrent() -> usize {
    llm::MAX_CONCURRENT
}
fn default_max_message_length() -> usize {
    llm::MAX_MESSAGE_LENGTH
}
fn default_llm_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            api_key: default_api_key(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            max_concurrent: default_llm_max_concurrent(),
            max_message_length: default_max_message_length(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Speech synthesis backend (OpenAI-compatible speech API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    #[serde(default = "default_tts_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_min_speed")]
    pub min_speed: f32,

    #[serde(default = "default_max_speed")]
    pub max_speed: f32,

    #[serde(default = "default_speed")]
    pub default_speed: f32,

    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    #[serde(default = "default_tts_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}
fn default_voice() -> String {
    "alloy".to_string()
}
fn default_min_speed() -> f32 {
    tts::MIN_SPEED
}
fn default_max_speed() -> f32 {
    tts::MAX_SPEED
}
fn default_speed() -> f32 {
    tts::DEFAULT_SPEED
}
fn default_max_text_length() -> usize {
    tts::MAX_TEXT_LENGTH
}
fn default_tts_max_concurrent() -> usize {
    tts::MAX_CONCURRENT
}

impl TtsConfig {
    /// Whether `speed` is inside the configured range
    pub fn accepts_speed(&self, speed: f32) -> bool {
        speed.is_finite() && speed >= self.min_speed && speed <= self.max_speed
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            api_key: default_api_key(),
            model: default_tts_model(),
            voice: default_voice(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            default_speed: default_speed(),
            max_text_length: default_max_text_length(),
            max_concurrent: default_tts_max_concurrent(),
            timeout_secs: default_speech_timeout_secs(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and the environment
///
/// Priority: env vars > config/{env} > config/default > built-in defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from an explicit configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_DIALOGUE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        dir = %dir.display(),
        env = env.unwrap_or("default"),
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.orchestrator.max_concurrent, 5);
        assert_eq!(settings.orchestrator.admission_grace(), Duration::from_millis(100));
        assert_eq!(settings.orchestrator.run_timeout(), None);
        assert_eq!(settings.conversation.max_turns, 20);
        assert_eq!(settings.conversation.ttl(), Duration::from_secs(3600));
        assert_eq!(settings.websocket.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(settings.orchestrator.supported_formats.len(), 6);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_audio_bounds_validation() {
        let mut settings = Settings::default();
        settings.orchestrator.min_audio_duration = 10.0;
        settings.orchestrator.max_audio_duration = 5.0;

        match settings.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "orchestrator.max_audio_duration");
            },
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut settings = Settings::default();
        settings.orchestrator.max_concurrent = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.tts.max_concurrent = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.conversation.max_conversations = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_speed_range_validation() {
        let mut settings = Settings::default();
        settings.tts.default_speed = 3.0;
        assert!(settings.validate().is_err());

        assert!(Settings::default().tts.accepts_speed(1.5));
        assert!(!Settings::default().tts.accepts_speed(0.25));
        assert!(!Settings::default().tts.accepts_speed(f32::NAN));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut default = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            default,
            "[orchestrator]\nmax_concurrent = 2\nrun_timeout_secs = 45\n\n[conversation]\nmax_turns = 6"
        )
        .unwrap();

        let mut staging = std::fs::File::create(dir.path().join("staging.toml")).unwrap();
        writeln!(staging, "environment = \"staging\"\n[server]\nport = 9000").unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.environment, RuntimeEnvironment::Staging);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.orchestrator.max_concurrent, 2);
        assert_eq!(settings.orchestrator.run_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(settings.conversation.max_turns, 6);
        assert_eq!(settings.conversation.max_conversations, 1000);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut default = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(default, "[orchestrator]\nmax_concurrent = 0").unwrap();

        assert!(load_settings_from(dir.path(), None).is_err());
    }
}
