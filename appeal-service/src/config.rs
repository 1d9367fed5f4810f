use std::time::Duration;

use crate::error::{AppealError, Result};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_EXTRACTION_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_GENERATION_MAX_TOKENS: u32 = 3000;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub extraction_max_tokens: u32,
    pub generation_max_tokens: u32,
    /// Transport timeout for completion requests; none by default
    pub request_timeout: Option<Duration>,
    /// Sessions untouched for this long are dropped from storage
    pub session_idle_ttl: Duration,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("ANTHROPIC_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppealError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
            })?;

        let request_timeout = match lookup("COMPLETION_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_number(
                "COMPLETION_TIMEOUT_SECS",
                &raw,
            )?)),
            None => None,
        };

        let session_idle_ttl = match lookup("SESSION_IDLE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_number("SESSION_IDLE_TTL_SECS", &raw)?),
            None => DEFAULT_SESSION_IDLE_TTL,
        };

        Ok(Self {
            api_key,
            api_url: lookup("COMPLETION_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: lookup("COMPLETION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            extraction_max_tokens: number_or(
                &lookup,
                "EXTRACTION_MAX_TOKENS",
                DEFAULT_EXTRACTION_MAX_TOKENS,
            )?,
            generation_max_tokens: number_or(
                &lookup,
                "GENERATION_MAX_TOKENS",
                DEFAULT_GENERATION_MAX_TOKENS,
            )?,
            request_timeout,
            session_idle_ttl,
            port: number_or(&lookup, "PORT", DEFAULT_PORT)?,
        })
    }
}

fn number_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => parse_number(key, &raw),
        None => Ok(default),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppealError::Config(format!("{key} must be a number, got {raw:?}")))
}
