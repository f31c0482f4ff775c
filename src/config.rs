//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::workflow::{DEFAULT_MAX_RESULTS, WorkflowConfig};

/// Assistant configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Language model backend and credentials.
    pub llm: LlmConfig,
    /// Node tunables.
    pub workflow: WorkflowConfig,
    /// Directory for rolling log files, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl AssistantConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend: LlmBackend = match lookup("MAIL_ASSIST_LLM_BACKEND") {
            Some(raw) => raw.parse()?,
            None => LlmBackend::OpenAi,
        };

        let key_var = backend.api_key_var();
        let api_key = lookup(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model =
            lookup("MAIL_ASSIST_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let defaults = WorkflowConfig::default();
        let max_results = match lookup("MAIL_ASSIST_MAX_RESULTS") {
            None => DEFAULT_MAX_RESULTS,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "MAIL_ASSIST_MAX_RESULTS".to_string(),
                        message: format!("'{raw}' is not a positive integer"),
                    });
                }
            },
        };
        let extraction_temperature = match lookup("MAIL_ASSIST_TEMPERATURE") {
            None => defaults.extraction_temperature,
            Some(raw) => match raw.trim().parse::<f32>() {
                Ok(t) if (0.0..=2.0).contains(&t) => t,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "MAIL_ASSIST_TEMPERATURE".to_string(),
                        message: format!("'{raw}' is not a temperature between 0 and 2"),
                    });
                }
            },
        };

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            workflow: WorkflowConfig {
                max_results,
                extraction_temperature,
                ..defaults
            },
            log_dir: lookup("MAIL_ASSIST_LOG_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_openai() {
        let config =
            AssistantConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.llm.backend, LlmBackend::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_key.expose_secret(), "sk-test");
        assert_eq!(config.workflow.max_results, 5);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn anthropic_needs_its_own_key() {
        let err = AssistantConfig::from_lookup(lookup_from(&[
            ("MAIL_ASSIST_LLM_BACKEND", "anthropic"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "ANTHROPIC_API_KEY"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = AssistantConfig::from_lookup(lookup_from(&[
            ("MAIL_ASSIST_LLM_BACKEND", "anthropic"),
            ("ANTHROPIC_API_KEY", "key"),
            ("MAIL_ASSIST_MODEL", "claude-3-5-haiku-latest"),
            ("MAIL_ASSIST_MAX_RESULTS", "10"),
            ("MAIL_ASSIST_TEMPERATURE", "0.2"),
            ("MAIL_ASSIST_LOG_DIR", "/tmp/mail-assist"),
        ]))
        .unwrap();
        assert_eq!(config.llm.model, "claude-3-5-haiku-latest");
        assert_eq!(config.workflow.max_results, 10);
        assert!((config.workflow.extraction_temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/mail-assist")));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        for (key, value) in [
            ("MAIL_ASSIST_MAX_RESULTS", "0"),
            ("MAIL_ASSIST_MAX_RESULTS", "five"),
            ("MAIL_ASSIST_TEMPERATURE", "9"),
        ] {
            let err = AssistantConfig::from_lookup(lookup_from(&[
                ("OPENAI_API_KEY", "sk-test"),
                (key, value),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key: ref k, .. } if k == key));
        }
    }
}
