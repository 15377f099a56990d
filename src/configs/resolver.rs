use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub debug: bool,
    /// Video used to bootstrap the player script and session token.
    #[serde(default = "default_sample_video_id")]
    pub sample_video_id: String,
    #[serde(default = "default_primary_client")]
    pub primary_client: String,
    #[serde(default = "default_fallback_client")]
    pub fallback_client: String,
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_sample_video_id() -> String {
    "aqz-KE-bpKQ".to_string()
}

fn default_primary_client() -> String {
    "TV".to_string()
}

fn default_fallback_client() -> String {
    "WEB_EMBEDDED".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            visitor_id: None,
            debug: false,
            sample_video_id: default_sample_video_id(),
            primary_client: default_primary_client(),
            fallback_client: default_fallback_client(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_inc_ms")]
    pub backoff_inc_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_inc_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    5000
}

impl RetryConfig {
    pub fn backoff_inc(&self) -> Duration {
        Duration::from_millis(self.backoff_inc_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_inc_ms: default_backoff_inc_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_page_capacity")]
    pub page_capacity: usize,
    /// Seconds a fetched page body is served from memory.
    #[serde(default = "default_page_ttl_secs")]
    pub page_ttl_secs: u64,
    /// Clear every resolution slot when the playback API rejects our context.
    #[serde(default)]
    pub invalidate_on_failure: bool,
}

fn default_page_capacity() -> usize {
    16
}

fn default_page_ttl_secs() -> u64 {
    30
}

impl CacheConfig {
    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_capacity: default_page_capacity(),
            page_ttl_secs: default_page_ttl_secs(),
            invalidate_on_failure: false,
        }
    }
}
