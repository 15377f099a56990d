use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
  common::errors::{ResolveError, Result},
  configs::*,
};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  #[serde(default)]
  pub resolver: ResolverConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub http: HttpConfig,
  pub logging: Option<LoggingConfig>,
}

impl Config {
  pub fn load() -> Result<Self> {
    let config_path = if Path::new("config.toml").exists() {
      "config.toml"
    } else if Path::new("config.default.toml").exists() {
      "config.default.toml"
    } else {
      return Err(ResolveError::Config(
        "config.toml or config.default.toml not found".into(),
      ));
    };

    tracing::info!("Loading configuration from: {}", config_path);
    Self::from_path(config_path)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path)?;
    if config_str.trim().is_empty() {
      return Err(ResolveError::Config(format!("{} is empty", path.display())));
    }

    Self::from_toml_str(&config_str)
  }

  pub fn from_toml_str(s: &str) -> Result<Self> {
    let config: Config = toml::from_str(s)?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_when_sections_missing() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.resolver.lang, "en");
    assert_eq!(config.resolver.primary_client, "TV");
    assert_eq!(config.resolver.fallback_client, "WEB_EMBEDDED");
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.backoff_inc_ms, 500);
    assert_eq!(config.retry.backoff_max_ms, 5000);
    assert_eq!(config.http.timeout_secs, 10);
    assert!(!config.cache.invalidate_on_failure);
    assert!(config.logging.is_none());
  }

  #[test]
  fn test_partial_sections() {
    let config = Config::from_toml_str(
      r#"
        [resolver]
        lang = "de"
        visitor_id = "CgtWaXNpdG9y"

        [retry]
        max_retries = 1

        [cache]
        invalidate_on_failure = true

        [logging]
        level = "debug"
      "#,
    )
    .unwrap();

    assert_eq!(config.resolver.lang, "de");
    assert_eq!(config.resolver.visitor_id.as_deref(), Some("CgtWaXNpdG9y"));
    assert_eq!(config.resolver.sample_video_id, "aqz-KE-bpKQ");
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.retry.backoff_inc_ms, 500);
    assert!(config.cache.invalidate_on_failure);
    assert_eq!(
      config.logging.and_then(|l| l.level).as_deref(),
      Some("debug")
    );
  }

  #[test]
  fn test_invalid_toml_is_config_error() {
    let err = Config::from_toml_str("[retry]\nmax_retries = \"many\"").unwrap_err();
    assert!(matches!(err, ResolveError::Config(_)));
  }
}
