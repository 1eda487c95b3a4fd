//! Session service: the request boundary
//!
//! Validates and normalizes one `/negotiate` request, assembles the
//! session-scoped state (game history, agent views, renderer, client),
//! runs the round orchestrator to completion, and exports the result.
//! This is the only place a hard failure may surface; everything the
//! orchestrator absorbs stays in the error stats.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{AgentStatePayload, AgentView};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::history::GameHistory;
use crate::llm::{LlmConfig, NegotiationClient, OpenAiClient};
use crate::negotiation::{ModelErrorStats, RoundOrchestrator};
use crate::power::Power;
use crate::prompt::PromptRenderer;

fn default_max_rounds() -> usize {
    3
}

/// Body of `POST /negotiate`.
#[derive(Debug, Clone, Deserialize)]
pub struct NegotiateRequest {
    pub saved_game: serde_json::Value,
    pub game_history: serde_json::Value,
    /// power name -> agent state; the keys define who negotiates.
    pub agent_state: BTreeMap<String, AgentStatePayload>,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Body of the 200 response.
#[derive(Debug, Clone, Serialize)]
pub struct NegotiateResponse {
    /// `"SENDER|RECIPIENT"` -> agreed statement
    pub agreed_statements: BTreeMap<String, String>,
    pub model_error_stats: BTreeMap<String, ModelErrorStats>,
}

/// Stateless service; all session state lives for one request.
pub struct SessionService {
    config: ServerConfig,
}

impl SessionService {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run one negotiation session with the configured HTTP client.
    pub async fn run(
        &self,
        request: NegotiateRequest,
        cancel: CancellationToken,
    ) -> Result<NegotiateResponse> {
        let model = request
            .model_name
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        let llm_config = LlmConfig::new(self.config.base_url.clone(), model)
            .with_api_key(self.config.api_key.clone())
            .with_timeout(self.config.request_timeout)
            .with_transcript(request.log_file_path.clone());
        let client = Arc::new(OpenAiClient::new(llm_config)?);
        self.run_with_client(request, client, cancel).await
    }

    /// Run one session against an injected client. Tests and embedders use
    /// this directly.
    pub async fn run_with_client(
        &self,
        request: NegotiateRequest,
        client: Arc<dyn NegotiationClient>,
        cancel: CancellationToken,
    ) -> Result<NegotiateResponse> {
        // Setup: every fault below here aborts before any round starts.
        let mut agents: BTreeMap<Power, AgentView> = BTreeMap::new();
        for (name, payload) in request.agent_state {
            let power = Power::normalize(&name)?;
            agents.insert(power, AgentView::from_payload(power, payload)?);
        }
        let active: Vec<Power> = agents.keys().copied().collect();

        let mut history =
            GameHistory::reconstruct(&request.saved_game, &request.game_history, active)?;

        let renderer = match request
            .prompts_dir
            .as_deref()
            .or(self.config.prompts_dir.as_deref())
        {
            Some(dir) => PromptRenderer::from_dir(dir)?,
            None => PromptRenderer::new()?,
        };

        info!(
            phase = history.current_phase_name(),
            powers = history.active_powers().len(),
            max_rounds = request.max_rounds,
            model = client.model_name(),
            "negotiation session starting"
        );

        let mut orchestrator = RoundOrchestrator::new(
            client,
            &renderer,
            &agents,
            request.max_rounds,
            cancel,
        );
        let outcome = orchestrator.run(&mut history).await?;

        Ok(NegotiateResponse {
            agreed_statements: outcome.ledger.export(),
            model_error_stats: outcome.stats.into_inner(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntenteError;
    use async_trait::async_trait;
    use serde_json::json;

    /// Client that proposes one agreement per call, to a fixed counterpart.
    struct OfferOne(BTreeMap<Power, Power>);

    impl OfferOne {
        fn france_germany() -> Arc<Self> {
            Arc::new(Self(BTreeMap::from([
                (Power::France, Power::Germany),
                (Power::Germany, Power::France),
            ])))
        }

        fn england_france() -> Arc<Self> {
            Arc::new(Self(BTreeMap::from([
                (Power::England, Power::France),
                (Power::France, Power::England),
            ])))
        }
    }

    #[async_trait]
    impl NegotiationClient for OfferOne {
        async fn send(&self, _prompt: &str, power: Power, _round: usize) -> Result<String> {
            let counterpart = self.0[&power];
            Ok(json!({
                "messages": [],
                "agreements": [
                    {"recipient": counterpart.name(), "statement": format!("pact with {power}")}
                ]
            })
            .to_string())
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    fn request(agent_state: serde_json::Value, max_rounds: usize) -> NegotiateRequest {
        serde_json::from_value(json!({
            "saved_game": {"phase": "S1901M"},
            "game_history": {"phases": [{"name": "S1901M"}]},
            "agent_state": agent_state,
            "max_rounds": max_rounds
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_two_powers_one_round() {
        let service = SessionService::new(ServerConfig::default());
        let req = request(json!({"FRANCE": {}, "GERMANY": {}}), 1);
        let resp = service
            .run_with_client(req, OfferOne::france_germany(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.agreed_statements.len(), 2);
        assert_eq!(
            resp.agreed_statements.get("FRANCE|GERMANY").unwrap(),
            "pact with FRANCE"
        );
        assert_eq!(
            resp.agreed_statements.get("GERMANY|FRANCE").unwrap(),
            "pact with GERMANY"
        );
        assert_eq!(resp.model_error_stats["stub-model"].conversation_errors, 0);
    }

    #[tokio::test]
    async fn unknown_power_fails_the_session() {
        let service = SessionService::new(ServerConfig::default());
        let req = request(json!({"NARNIA": {}}), 1);
        let err = service
            .run_with_client(req, OfferOne::france_germany(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EntenteError::UnknownPower { .. }));
    }

    #[tokio::test]
    async fn malformed_history_fails_the_session() {
        let service = SessionService::new(ServerConfig::default());
        let mut req = request(json!({"FRANCE": {}}), 1);
        req.game_history = json!({"phases": [{"plans": {}}]});
        let err = service
            .run_with_client(req, OfferOne::france_germany(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EntenteError::MalformedSnapshot { .. }));
    }

    #[tokio::test]
    async fn invalid_agent_state_fails_the_session() {
        let service = SessionService::new(ServerConfig::default());
        let req = request(
            json!({"FRANCE": {"relationships": {"MORDOR": "ENEMY"}}}),
            1,
        );
        let err = service
            .run_with_client(req, OfferOne::france_germany(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EntenteError::InvalidAgentState { .. }));
    }

    #[test]
    fn max_rounds_defaults_to_three() {
        let req: NegotiateRequest = serde_json::from_value(json!({
            "saved_game": {},
            "game_history": {},
            "agent_state": {}
        }))
        .unwrap();
        assert_eq!(req.max_rounds, 3);
    }

    #[tokio::test]
    async fn power_aliases_accepted_at_the_boundary() {
        let service = SessionService::new(ServerConfig::default());
        let req = request(json!({"uk": {}, "France": {}}), 1);
        let resp = service
            .run_with_client(req, OfferOne::england_france(), CancellationToken::new())
            .await
            .unwrap();
        assert!(resp.agreed_statements.contains_key("ENGLAND|FRANCE"));
    }
}
