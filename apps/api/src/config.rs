use anyhow::{bail, Context, Result};

use crate::llm_client::OpenAiModelConfig;

/// Rate limiter configuration. Read once at startup, never reloaded.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests_per_minute: u32,
    pub max_tokens_per_minute: u32,
}

/// Response cache configuration. Read once at startup, never reloaded.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_minutes: u64,
    pub max_entries: usize,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or out of range.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai: OpenAiModelConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let openai = OpenAiModelConfig {
            model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            max_tokens: parse_env("OPENAI_MAX_TOKENS", 2000)?,
            temperature: parse_env("OPENAI_TEMPERATURE", 0.7)?,
            top_p: parse_env("OPENAI_TOP_P", 1.0)?,
            frequency_penalty: parse_env("OPENAI_FREQUENCY_PENALTY", 0.0)?,
            presence_penalty: parse_env("OPENAI_PRESENCE_PENALTY", 0.0)?,
        };
        validate_model_config(&openai)?;

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai,
            rate_limit: RateLimitConfig {
                enabled: parse_env("RATE_LIMIT_ENABLED", true)?,
                max_requests_per_minute: parse_env("RATE_LIMIT_MAX_REQUESTS_PER_MINUTE", 10)?,
                max_tokens_per_minute: parse_env("RATE_LIMIT_MAX_TOKENS_PER_MINUTE", 40_000)?,
            },
            cache: CacheConfig {
                enabled: parse_env("CACHE_ENABLED", true)?,
                ttl_minutes: parse_env("CACHE_TTL_MINUTES", 60)?,
                max_entries: parse_env("CACHE_MAX_ENTRIES", 100)?,
            },
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

/// Range sanity for the pass-through OpenAI tuning fields.
fn validate_model_config(config: &OpenAiModelConfig) -> Result<()> {
    if config.model.trim().is_empty() {
        bail!("OPENAI_MODEL must not be empty");
    }
    if config.max_tokens == 0 {
        bail!("OPENAI_MAX_TOKENS must be greater than zero");
    }
    if !(0.0..=2.0).contains(&config.temperature) {
        bail!("OPENAI_TEMPERATURE must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&config.top_p) {
        bail!("OPENAI_TOP_P must be in [0.0, 1.0]");
    }
    for (name, value) in [
        ("OPENAI_FREQUENCY_PENALTY", config.frequency_penalty),
        ("OPENAI_PRESENCE_PENALTY", config.presence_penalty),
    ] {
        if !(-2.0..=2.0).contains(&value) {
            bail!("{name} must be in [-2.0, 2.0]");
        }
    }
    Ok(())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value")),
        Err(_) => Ok(default),
    }
}
