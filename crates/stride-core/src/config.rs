//! Pipeline configuration
//!
//! Defaults, then an optional TOML file, then environment overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stride_llm::{GatewayConfig, DEFAULT_API_BASE, DEFAULT_MODEL};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model name
    pub model: String,
    /// OpenAI-compatible API base
    pub api_base: String,
    /// API key; read from `OPENAI_API_KEY` when absent
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Response budget for the diagram extraction call
    pub extraction_max_tokens: u32,
    /// Response budget for each enrichment call
    pub enrichment_max_tokens: u32,
    /// Deadline for every external call, in seconds
    pub call_timeout_secs: u64,
    /// Maximum enrichment calls in flight at once
    pub max_concurrent_enrichments: usize,
    /// Maximum cached reports
    pub report_cache_capacity: u64,
    /// Optional cached-report lifetime, in seconds
    pub report_cache_ttl_secs: Option<u64>,
    /// Root of the file store
    pub data_dir: PathBuf,
    /// URL prefix for stored images
    pub static_prefix: String,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With model name
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With API key
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// With enrichment concurrency cap
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrent_enrichments = max;
        self
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With file store root
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Per-call timeout
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Parse from TOML text; missing keys keep their defaults
    ///
    /// # Errors
    /// - `ConfigError::Parse` on invalid TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` on invalid TOML
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if a numeric override does not parse
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    ///
    /// Recognized keys: `STRIDE_MODEL`, `STRIDE_API_BASE`, `OPENAI_API_KEY`,
    /// `STRIDE_DATA_DIR`, `STRIDE_MAX_CONCURRENCY`.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if a numeric override does not parse
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(model) = lookup("STRIDE_MODEL") {
            self.model = model;
        }
        if let Some(base) = lookup("STRIDE_API_BASE") {
            self.api_base = base;
        }
        if self.api_key.is_none() {
            self.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        }
        if let Some(dir) = lookup("STRIDE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = lookup("STRIDE_MAX_CONCURRENCY") {
            self.max_concurrent_enrichments = max.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("STRIDE_MAX_CONCURRENCY must be a number, got '{max}'"))
            })?;
        }
        Ok(self)
    }

    /// Check consistency
    ///
    /// # Errors
    /// - `ConfigError::Invalid` describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_enrichments == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_enrichments must be at least 1".into(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be at least 1".into()));
        }
        if self.enrichment_max_tokens == 0 || self.extraction_max_tokens == 0 {
            return Err(ConfigError::Invalid("token budgets must be positive".into()));
        }
        if self.enrichment_max_tokens >= self.extraction_max_tokens {
            return Err(ConfigError::Invalid(format!(
                "enrichment budget ({}) must be smaller than extraction budget ({})",
                self.enrichment_max_tokens, self.extraction_max_tokens
            )));
        }
        Ok(())
    }

    /// Connection settings for the HTTP gateway
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            request_timeout: self.call_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            extraction_max_tokens: 2000,
            enrichment_max_tokens: 600,
            call_timeout_secs: 60,
            max_concurrent_enrichments: 4,
            report_cache_capacity: 1000,
            report_cache_ttl_secs: None,
            data_dir: std::env::temp_dir().join("stride-data"),
            static_prefix: "/static".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(config.enrichment_max_tokens < config.extraction_max_tokens);
    }

    #[test]
    fn toml_overrides_keep_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            model = "gpt-4o"
            max_concurrent_enrichments = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_concurrent_enrichments, 8);
        assert_eq!(config.extraction_max_tokens, 2000);
    }

    #[test]
    fn toml_rejects_wrong_types() {
        let err = PipelineConfig::from_toml_str("call_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STRIDE_MODEL", "local-vision"),
            ("OPENAI_API_KEY", "sk-test"),
            ("STRIDE_MAX_CONCURRENCY", "2"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .apply_env_from(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.model, "local-vision");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.max_concurrent_enrichments, 2);
    }

    #[test]
    fn env_does_not_replace_explicit_key() {
        let config = PipelineConfig::default()
            .with_api_key("from-file")
            .apply_env_from(|k| (k == "OPENAI_API_KEY").then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn env_rejects_bad_number() {
        let err = PipelineConfig::default()
            .apply_env_from(|k| (k == "STRIDE_MAX_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_inconsistent_values() {
        assert!(PipelineConfig::default().with_max_concurrency(0).validate().is_err());

        let mut config = PipelineConfig::default();
        config.enrichment_max_tokens = 4000;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.call_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let config = PipelineConfig::default().with_api_key("secret");
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("secret"));
    }
}
