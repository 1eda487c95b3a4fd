//! OpenAI-compatible negotiation client
//!
//! Thin HTTP wrapper around a chat-completions endpoint. Every failure is
//! mapped into a typed [`EntenteError`] client fault; the orchestrator
//! absorbs those per call, so nothing here retries.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient, StatusCode,
};
use tracing::{debug, warn};

use super::chat::{ChatMessage, ChatRequest, ChatResponse};
use super::NegotiationClient;
use crate::error::{EntenteError, Result};
use crate::power::Power;

const USER_AGENT: &str = concat!("entente/", env!("CARGO_PKG_VERSION"));

/// Configuration for one [`OpenAiClient`]
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub temperature: f32,
    /// When set, one CSV transcript row is appended per call.
    pub transcript_path: Option<PathBuf>,
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            request_timeout: Duration::from_secs(120),
            temperature: 0.7,
            transcript_path: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_transcript(mut self, path: Option<PathBuf>) -> Self {
        self.transcript_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Validate an API key can be used in an Authorization header.
///
/// Header values reject control characters, so a key that smuggles a
/// newline would otherwise fail deep inside reqwest with a confusing error.
pub fn validate_api_key(api_key: &str) -> Result<String> {
    let trimmed = api_key.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Err(EntenteError::InvalidConfig {
            message: "API key is empty or set to 'none'".to_string(),
        });
    }
    for (index, ch) in trimmed.char_indices() {
        if ch.is_control() {
            return Err(EntenteError::InvalidConfig {
                message: format!("API key contains a control character at position {index}"),
            });
        }
    }
    Ok(trimmed.to_string())
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiClient {
    config: LlmConfig,
    http_client: HttpClient,
    // CSV appends from concurrent round calls must not interleave
    transcript_lock: Mutex<()>,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EntenteError::Internal {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            http_client,
            transcript_lock: Mutex::new(()),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.config.api_key {
            let key = validate_api_key(key)?;
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                EntenteError::InvalidConfig {
                    message: "API key is not a valid header value".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest::new(
            self.config.model.clone(),
            vec![ChatMessage::user(prompt)],
        )
        .with_temperature(self.config.temperature);

        let response = self
            .http_client
            .post(self.completions_url())
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EntenteError::Timeout {
                        duration: self.config.request_timeout,
                    }
                } else {
                    EntenteError::ConnectionFailed {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EntenteError::ProviderError {
                    status: status.as_u16(),
                    message: "authentication rejected".to_string(),
                },
                _ => EntenteError::ProviderError {
                    status: status.as_u16(),
                    message: truncate(&body, 300),
                },
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| EntenteError::ProviderError {
            status: status.as_u16(),
            message: format!("undecodable completion body: {e}"),
        })?;

        match parsed.first_content() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(EntenteError::EmptyCompletion {
                model: self.config.model.clone(),
            }),
        }
    }

    /// Append one transcript row. Transcript failures are logged, never
    /// surfaced; losing a log line must not cost a negotiation call.
    fn log_transcript(&self, power: Power, round: usize, prompt_len: usize, outcome: &str) {
        let Some(ref path) = self.config.transcript_path else {
            return;
        };
        let _guard = self.transcript_lock.lock().unwrap_or_else(|p| p.into_inner());
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(EntenteError::from)
            .and_then(|file| {
                let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
                writer
                    .write_record([
                        chrono::Utc::now().to_rfc3339(),
                        self.config.model.clone(),
                        power.name().to_string(),
                        round.to_string(),
                        prompt_len.to_string(),
                        outcome.to_string(),
                    ])
                    .and_then(|_| writer.flush().map_err(csv::Error::from))
                    .map_err(|e| EntenteError::Internal {
                        message: e.to_string(),
                    })
            });
        if let Err(e) = result {
            warn!(path = %path.display(), "transcript write failed: {e}");
        }
    }
}

#[async_trait]
impl NegotiationClient for OpenAiClient {
    async fn send(&self, prompt: &str, power: Power, round: usize) -> Result<String> {
        debug!(%power, round, prompt_len = prompt.len(), "negotiation call");
        let result = self.complete(prompt).await;
        let outcome = match &result {
            Ok(reply) => format!("ok:{}", reply.len()),
            Err(e) => format!("err:{e}"),
        };
        self.log_transcript(power, round, prompt.len(), &outcome);
        result
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_api_key() {
        assert_eq!(validate_api_key(" sk-abc ").unwrap(), "sk-abc");
        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("none").is_err());
        assert!(validate_api_key("sk\nabc").is_err());
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let client =
            OpenAiClient::new(LlmConfig::new("https://example.test/v1/", "m")).unwrap();
        assert_eq!(
            client.completions_url(),
            "https://example.test/v1/chat/completions"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 10), "abc");
        let t = truncate("héllo wörld", 6);
        assert!(t.ends_with("..."));
    }

    #[test]
    fn test_transcript_row_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.csv");
        let config = LlmConfig::new("https://example.test/v1", "test-model")
            .with_transcript(Some(path.clone()));
        let client = OpenAiClient::new(config).unwrap();

        client.log_transcript(Power::France, 2, 140, "ok:77");
        client.log_transcript(Power::Germany, 2, 150, "err:timeout");

        let body = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("FRANCE"));
        assert!(lines[1].contains("GERMANY"));
    }
}
