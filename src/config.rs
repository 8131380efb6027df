//! Application configuration
//!
//! Aggregates per-component configs. The inference credential is a
//! deployment-time requirement: `validate()` runs in `main` before any
//! turn logic and short-circuits with a fixed diagnostic when it is
//! missing.

use crate::avatar::AvatarConfig;
use crate::inference::InferenceConfig;
use crate::speech::SpeechOutputConfig;
use crate::{KaiwaError, Result};

pub const ENDPOINT_ENV: &str = "KAIWA_ENDPOINT";
pub const API_KEY_ENV: &str = "KAIWA_API_KEY";
pub const LANGUAGE_ENV: &str = "KAIWA_LANGUAGE";

/// Configuration for the complete application
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Inference proxy configuration
    pub inference: InferenceConfig,

    /// Speech output configuration (voice language)
    pub speech: SpeechOutputConfig,

    /// Avatar cue derivation configuration
    pub avatar: AvatarConfig,
}

impl AppConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            config.inference = config.inference.with_endpoint(endpoint);
        }
        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            if !api_key.trim().is_empty() {
                config.inference = config.inference.with_api_key(api_key.trim());
            }
        }
        if let Ok(language) = std::env::var(LANGUAGE_ENV) {
            config.speech = config.speech.with_language(language);
        }

        config
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_speech(mut self, speech: SpeechOutputConfig) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_avatar(mut self, avatar: AvatarConfig) -> Self {
        self.avatar = avatar;
        self
    }

    /// Validate the configuration before any turn logic runs
    pub fn validate(&self) -> Result<()> {
        if self.inference.endpoint.trim().is_empty() {
            return Err(KaiwaError::ConfigError(format!(
                "inference endpoint is required (set {})",
                ENDPOINT_ENV
            )));
        }
        if !self.inference.endpoint.starts_with("http://")
            && !self.inference.endpoint.starts_with("https://")
        {
            return Err(KaiwaError::ConfigError(format!(
                "inference endpoint must be an http(s) URL: {}",
                self.inference.endpoint
            )));
        }

        // Deployment-time requirement, not a runtime turn failure
        match &self.inference.api_key {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(KaiwaError::ConfigError(format!(
                    "no inference credential configured; set {} before starting",
                    API_KEY_ENV
                )));
            }
        }

        if self.speech.language.trim().is_empty() {
            return Err(KaiwaError::ConfigError(
                "speech language tag must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_lacks_credential() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, KaiwaError::ConfigError(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let config = AppConfig::default()
            .with_inference(InferenceConfig::default().with_api_key("secret"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = AppConfig::default().with_inference(
            InferenceConfig::default()
                .with_endpoint("ftp://example.com")
                .with_api_key("secret"),
        );
        assert!(config.validate().is_err());
    }
}
