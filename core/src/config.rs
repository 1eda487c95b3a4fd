//! Server configuration
//!
//! One explicit struct, built once at process start and passed into the
//! session service. Readiness problems are collected into a report and
//! logged up front instead of surfacing as runtime faults on first use.

use std::path::PathBuf;
use std::time::Duration;

use crate::llm::client::validate_api_key;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Process-wide configuration for the negotiation service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Chat-completions endpoint base URL.
    pub base_url: String,
    /// Model used when a request does not name one.
    pub default_model: String,
    pub api_key: Option<String>,
    /// Default prompt-template directory; requests may override.
    pub prompts_dir: Option<PathBuf>,
    /// Per-call deadline for the LLM client.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            api_key: None,
            prompts_dir: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Startup readiness report: warnings only, never a hard failure. A server
/// without an API key still starts; affected sessions just record
/// conversation errors.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    pub warnings: Vec<String>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl ServerConfig {
    /// Validate the configuration once, up front.
    pub fn readiness(&self) -> Readiness {
        let mut warnings = Vec::new();

        match &self.api_key {
            None => warnings.push("no API key configured; provider calls will be rejected".to_string()),
            Some(key) => {
                if let Err(e) = validate_api_key(key) {
                    warnings.push(format!("API key unusable: {e}"));
                }
            }
        }

        if self.base_url.trim().is_empty() {
            warnings.push("base URL is empty".to_string());
        }

        if let Some(dir) = &self.prompts_dir {
            if !dir.is_dir() {
                warnings.push(format!("prompts dir {} does not exist", dir.display()));
            }
        }

        Readiness { warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_warns_about_missing_key() {
        let readiness = ServerConfig::default().readiness();
        assert!(!readiness.is_ready());
        assert!(readiness.warnings[0].contains("API key"));
    }

    #[test]
    fn test_configured_server_is_ready() {
        let config = ServerConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(config.readiness().is_ready());
    }

    #[test]
    fn test_missing_prompts_dir_is_reported() {
        let config = ServerConfig {
            api_key: Some("sk-test".to_string()),
            prompts_dir: Some(PathBuf::from("/definitely/not/here")),
            ..Default::default()
        };
        let readiness = config.readiness();
        assert_eq!(readiness.warnings.len(), 1);
        assert!(readiness.warnings[0].contains("prompts dir"));
    }
}
