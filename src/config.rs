//! Runtime configuration, read from the environment (and `.env` if present).
//! The API key stays server-side: it is only ever placed in the Authorization
//! header of outbound requests and never logged.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::EnhanceError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct EnhancerConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Hard deadline for a single upstream attempt.
    pub request_timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_base_delay: Duration,
    pub max_jitter: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub state_db: Option<PathBuf>,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            rate_limit_base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
            cache_ttl: Duration::from_secs(600),
            cache_capacity: 100,
            state_db: None,
        }
    }
}

impl std::fmt::Debug for EnhancerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancerConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .field("state_db", &self.state_db)
            .finish_non_exhaustive()
    }
}

impl EnhancerConfig {
    /// Build from `PROMPT_ENHANCER_*` variables, falling back to defaults.
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let api_key = env_var("PROMPT_ENHANCER_API_KEY").or_else(|| env_var("OPENAI_API_KEY"));

        Self {
            api_key,
            base_url: env_var("PROMPT_ENHANCER_BASE_URL").unwrap_or(defaults.base_url),
            model: env_var("PROMPT_ENHANCER_MODEL").unwrap_or(defaults.model),
            request_timeout: env_parse("PROMPT_ENHANCER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_attempts: env_parse::<u32>("PROMPT_ENHANCER_MAX_ATTEMPTS")
                .map(|n| n.max(1))
                .unwrap_or(defaults.max_attempts),
            cache_ttl: env_parse("PROMPT_ENHANCER_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: env_parse::<usize>("PROMPT_ENHANCER_CACHE_CAPACITY")
                .map(|n| n.max(1))
                .unwrap_or(defaults.cache_capacity),
            state_db: env_var("PROMPT_ENHANCER_STATE_DB").map(PathBuf::from),
            ..defaults
        }
    }

    /// The upstream credential, or a configuration error when it is missing.
    pub fn require_api_key(&self) -> Result<&str, EnhanceError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(EnhanceError::Configuration(
                "PROMPT_ENHANCER_API_KEY (or OPENAI_API_KEY) is not set".into(),
            )),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_var(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_configuration_error() {
        let config = EnhancerConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(EnhanceError::Configuration(_))
        ));

        let config = EnhancerConfig {
            api_key: Some("   ".into()),
            ..EnhancerConfig::default()
        };
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = EnhancerConfig {
            api_key: Some("sk-secret".into()),
            ..EnhancerConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
