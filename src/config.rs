use std::time::Duration;

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Largest page the helpdesk search endpoint will serve.
pub const MAX_SEARCH_PAGE_SIZE: u32 = 150;

/// Application configuration loaded from environment variables
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub helpdesk_api_token: Option<SecretString>,

    #[serde(default = "default_helpdesk_base_url")]
    pub helpdesk_base_url: String,

    #[serde(default = "default_helpdesk_api_version")]
    pub helpdesk_api_version: String,

    pub ai_api_key: Option<SecretString>,

    #[serde(default = "default_ai_base_url")]
    pub ai_base_url: String,

    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    #[serde(default = "default_ai_max_tokens")]
    pub ai_max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_enrich_batch_size")]
    pub enrich_batch_size: usize,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_max_saturated_retries")]
    pub max_saturated_retries: u32,

    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    #[serde(default = "default_topic_cache_ttl_secs")]
    pub topic_cache_ttl_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/helpdesk_insights".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_helpdesk_base_url() -> String {
    "https://api.intercom.io".to_string()
}

fn default_helpdesk_api_version() -> String {
    "2.11".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_enrich_batch_size() -> usize {
    5
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_max_saturated_retries() -> u32 {
    5
}

fn default_search_page_size() -> u32 {
    MAX_SEARCH_PAGE_SIZE
}

fn default_topic_cache_ttl_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Configuration with every default filled in and no credentials.
    pub fn with_defaults() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            helpdesk_api_token: None,
            helpdesk_base_url: default_helpdesk_base_url(),
            helpdesk_api_version: default_helpdesk_api_version(),
            ai_api_key: None,
            ai_base_url: default_ai_base_url(),
            ai_model: default_ai_model(),
            ai_max_tokens: default_ai_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            enrich_batch_size: default_enrich_batch_size(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_saturated_retries: default_max_saturated_retries(),
            search_page_size: default_search_page_size(),
            topic_cache_ttl_secs: default_topic_cache_ttl_secs(),
        }
    }

    /// Helpdesk bearer token, or a configuration error when unset
    pub fn require_helpdesk_token(&self) -> AppResult<&str> {
        self.helpdesk_api_token
            .as_ref()
            .map(|s| s.expose_secret())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Configuration("HELPDESK_API_TOKEN not configured".to_string()))
    }

    /// AI service key, or a configuration error when unset
    pub fn require_ai_key(&self) -> AppResult<&str> {
        self.ai_api_key
            .as_ref()
            .map(|s| s.expose_secret())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Configuration("AI_API_KEY not configured".to_string()))
    }

    /// Search page size clamped to what the helpdesk accepts
    pub fn effective_page_size(&self) -> u32 {
        self.search_page_size.clamp(1, MAX_SEARCH_PAGE_SIZE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn batch_size(&self) -> usize {
        self.enrich_batch_size.max(1)
    }
}
