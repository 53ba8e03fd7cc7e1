use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::Language;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SakinaConfig {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub agent: AgentConfig,
    pub generative: GenerativeConfig,
    pub chat: ChatConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    pub default_language: Language,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_language: Language::En,
        }
    }
}

/// Backend Data Client settings. `backend` is one of `postgrest`, `postgres`
/// or `memory`; `url` is the project URL for PostgREST and the connection
/// string for Postgres.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub read_retries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "postgrest".to_string(),
            url: None,
            api_key: None,
            max_connections: 5,
            timeout_secs: 10,
            read_retries: 2,
        }
    }
}

/// Enterprise conversational agent (Adapter A).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub assistant_id: Option<String>,
    pub token_url: String,
    pub version: String,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            assistant_id: None,
            token_url: "https://iam.cloud.ibm.com/identity/token".to_string(),
            version: "2021-06-14".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Generative model (Adapter B).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerativeConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub attempt_timeout_secs: u64,
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 8,
            history_limit: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl SakinaConfig {
    /// Load from an optional TOML file, overridden by `SAKINA__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("SAKINA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut config: Self = s.try_deserialize()?;
        config.apply_env_fallbacks();
        Ok(config)
    }

    fn apply_env_fallbacks(&mut self) {
        if self.generative.api_key.as_deref().map_or(true, str::is_empty) {
            self.generative.api_key = std::env::var("GOOGLE_API_KEY").ok();
        }
    }
}

/// Treat empty strings from files or env the same as absent values.
pub(crate) fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_credentials_absent() {
        let config = SakinaConfig::default();
        assert_eq!(config.store.backend, "postgrest");
        assert!(config.agent.api_key.is_none());
        assert!(config.generative.api_key.is_none());
        assert_eq!(config.chat.attempt_timeout_secs, 8);
        assert_eq!(config.http.port, 8780);
    }

    #[test]
    fn test_required_treats_blank_as_missing() {
        assert_eq!(required(&None), None);
        assert_eq!(required(&Some("   ".to_string())), None);
        assert_eq!(required(&Some(" key ".to_string())), Some("key"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = SakinaConfig::load("does-not-exist.toml").expect("defaults should load");
        assert_eq!(config.agent.version, "2021-06-14");
        assert_eq!(config.service.default_language, Language::En);
    }
}
