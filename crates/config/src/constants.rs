//! Centralized constants for the voice dialogue engine
//!
//! Defaults used by more than one crate live here so that the settings
//! defaults, the collaborators and the tests agree on the same numbers.

/// Admission control for whole pipeline runs
pub mod admission {
    /// Concurrent orchestrator runs
    pub const MAX_CONCURRENT_RUNS: usize = 5;

    /// How long a run may wait for a permit before being rejected
    pub const GRACE_PERIOD_MS: u64 = 100;

    /// Retry hint returned with `TOO_MANY_REQUESTS`
    pub const RETRY_AFTER_SECS: u64 = 5;
}

/// Input audio bounds
pub mod audio {
    pub const MIN_DURATION_SECS: f64 = 0.5;

    /// Five minutes
    pub const MAX_DURATION_SECS: f64 = 300.0;

    pub const SUPPORTED_FORMATS: [&str; 6] = ["wav", "mp3", "m4a", "webm", "flac", "ogg"];

    /// Sample rate assumed for streamed PCM16 chunks
    pub const STREAM_SAMPLE_RATE: u32 = 16_000;
}

/// Conversation context cache
pub mod conversation {
    pub const MAX_TURNS: usize = 20;
    pub const MAX_CONVERSATIONS: usize = 1000;
    pub const TTL_MINUTES: u64 = 60;
}

/// Text generation
pub mod llm {
    pub const MAX_CONCURRENT: usize = 10;
    pub const MAX_MESSAGE_LENGTH: usize = 4000;
    pub const MAX_TOKENS: u32 = 1000;

    /// Retry hint returned with `LLM_RATE_LIMITED`
    pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly voice assistant. \
        Answer in short, natural sentences that sound good when spoken aloud. \
        Avoid markdown, lists and code.";
}

/// Speech synthesis
pub mod tts {
    pub const MIN_SPEED: f32 = 0.5;
    pub const MAX_SPEED: f32 = 2.0;
    pub const DEFAULT_SPEED: f32 = 1.0;
    pub const MAX_TEXT_LENGTH: usize = 5000;
    pub const MAX_CONCURRENT: usize = 3;

    /// OpenAI-compatible `pcm` output is 24kHz mono PCM16
    pub const PCM_SAMPLE_RATE: u32 = 24_000;
}

/// Speech recognition
pub mod stt {
    pub const MAX_CONCURRENT: usize = 2;
}

/// Streaming sessions
pub mod websocket {
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
    pub const MAX_STREAM_SECS: u64 = 60;
    pub const MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;
}

/// Default service endpoints
pub mod endpoints {
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
}
