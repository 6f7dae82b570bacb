//! Gateway configuration.
//!
//! Everything comes from environment variables (a local `.env` is honored
//! via `dotenvy`), loaded once into a single `Config` that is shared with
//! the handlers. Non-critical settings default; malformed numbers are a
//! startup error rather than a silent fallback.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,

    /// OpenAI-compatible chat endpoint for the text model.
    pub text_base_url: String,
    pub text_model: String,
    /// OpenAI-compatible chat endpoint for the vision model.
    pub vision_base_url: String,
    pub vision_model: String,
    pub chat_api_key: Option<String>,
    /// Chat-call timeout; kept below the transport timeout so a stuck
    /// model degrades the turn instead of failing it.
    pub llm_timeout: Duration,

    /// Speech-to-text service; absent key means transcript-only operation.
    pub asr_base_url: String,
    pub asr_api_key: Option<String>,
    pub asr_timeout: Duration,

    /// Upper bound on extracted/generated word lists.
    pub max_words: usize,
    /// Extra attempts allowed before a word is revealed.
    pub retry_budget: u32,

    pub session_db_path: PathBuf,
    pub session_ttl: Duration,
}

fn var_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    // *   `BIND_ADDR`: listen address. Defaults to "0.0.0.0:8000".
    // *   `VLLM_TEXT_BASE` / `VLLM_TEXT_MODEL`: chat endpoint for letter
    //     extraction, word context, and word generation.
    // *   `VLLM_VL_BASE` / `VLLM_VL_MODEL`: chat endpoint for image word
    //     extraction.
    // *   `CHAT_API_KEY`: (optional) bearer token for both chat endpoints.
    // *   `LLM_TIMEOUT_S`: chat-call timeout in seconds. Defaults to 20.
    // *   `ASR_BASE_URL` / `ASR_API_KEY`: speech-to-text service; without
    //     a key, audio uploads are rejected and live transcripts are used.
    // *   `ASR_TIMEOUT_S`: speech-to-text timeout. Defaults to 30.
    // *   `MAX_WORDS`: word-list cap. Defaults to 200.
    // *   `RETRY_ON_WRONG`: retries before revealing. Defaults to 1.
    // *   `SESSION_DB_PATH`: SQLite session database path.
    // *   `SESSION_TTL_SECONDS`: session expiry. Defaults to 7 days.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8000"),
            text_base_url: var_or("VLLM_TEXT_BASE", "http://localhost:8001/v1"),
            text_model: var_or("VLLM_TEXT_MODEL", "meta-llama/Llama-3.1-8B-Instruct"),
            vision_base_url: var_or("VLLM_VL_BASE", "http://localhost:8002/v1"),
            vision_model: var_or("VLLM_VL_MODEL", "Qwen/Qwen2-VL-7B-Instruct"),
            chat_api_key: env::var("CHAT_API_KEY").ok(),
            llm_timeout: Duration::from_secs(parse_or("LLM_TIMEOUT_S", 20)?),
            asr_base_url: var_or("ASR_BASE_URL", "https://api.elevenlabs.io"),
            asr_api_key: env::var("ASR_API_KEY").ok(),
            asr_timeout: Duration::from_secs(parse_or("ASR_TIMEOUT_S", 30)?),
            max_words: parse_or("MAX_WORDS", 200)?,
            retry_budget: parse_or("RETRY_ON_WRONG", 1)?,
            session_db_path: PathBuf::from(var_or("SESSION_DB_PATH", "spellingbee_sessions.db")),
            session_ttl: Duration::from_secs(parse_or("SESSION_TTL_SECONDS", 7 * 24 * 3600)?),
        })
    }
}
