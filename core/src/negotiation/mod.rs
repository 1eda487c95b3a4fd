//! Negotiation round orchestration
//!
//! Drives the fixed number of negotiation rounds for one session. Each
//! round fans one client call per active power out concurrently, waits for
//! every call to settle (the round barrier), then merges the round's
//! parsed messages and proposals in canonical power order. A power whose
//! call or reply fails contributes nothing that round; the failure is
//! counted against the model and never escalates.
//!
//! Cancellation abandons the in-flight round entirely: the outcome
//! reflects fully completed rounds only, including error counts.

pub mod ledger;
pub mod parser;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::AgentView;
use crate::error::{EntenteError, Result};
use crate::history::GameHistory;
use crate::llm::NegotiationClient;
use crate::power::Power;
use crate::prompt::PromptRenderer;

pub use ledger::{AgreementKey, AgreementLedger, ErrorStats, ModelErrorStats};
pub use parser::{parse_reply, Contribution};

/// Orchestrator lifecycle, advanced once per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    NotStarted,
    RoundInProgress(usize),
    RoundComplete(usize),
    Finished,
}

/// What a session hands back to the caller.
#[derive(Debug)]
pub struct NegotiationOutcome {
    pub ledger: AgreementLedger,
    pub stats: ErrorStats,
    pub rounds_completed: usize,
    /// True when the caller's cancellation signal cut the session short.
    pub cancelled: bool,
}

/// Drives `max_rounds` negotiation rounds over one mutable game history.
pub struct RoundOrchestrator<'a> {
    client: Arc<dyn NegotiationClient>,
    renderer: &'a PromptRenderer,
    agents: &'a BTreeMap<Power, AgentView>,
    max_rounds: usize,
    cancel: CancellationToken,
    state: OrchestratorState,
}

impl<'a> RoundOrchestrator<'a> {
    pub fn new(
        client: Arc<dyn NegotiationClient>,
        renderer: &'a PromptRenderer,
        agents: &'a BTreeMap<Power, AgentView>,
        max_rounds: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            renderer,
            agents,
            max_rounds,
            cancel,
            state: OrchestratorState::NotStarted,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Run to completion (or cancellation). Always runs exactly
    /// `max_rounds` rounds; there is no convergence-based early exit, so
    /// sessions are reproducible for a given client.
    pub async fn run(&mut self, history: &mut GameHistory) -> Result<NegotiationOutcome> {
        let model = self.client.model_name().to_string();
        let mut ledger = AgreementLedger::new();
        let mut stats = ErrorStats::new();
        stats.register(&model);

        let mut rounds_completed = 0;
        let mut cancelled = false;

        for round in 1..=self.max_rounds {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.state = OrchestratorState::RoundInProgress(round);

            // Prompts are built before the fan-out, so every power sees
            // the same history: everything up to the end of round-1.
            let prompts = self.build_prompts(history, round)?;

            let calls = prompts.into_iter().map(|(power, prompt)| {
                let client = Arc::clone(&self.client);
                async move { (power, client.send(&prompt, power, round).await) }
            });

            let results = tokio::select! {
                results = futures::future::join_all(calls) => results,
                _ = self.cancel.cancelled() => {
                    info!(round, "cancelled mid-round, abandoning in-flight calls");
                    cancelled = true;
                    break;
                }
            };

            // Round barrier passed: merge contributions in power order.
            let (round_ledger, round_stats) = self.merge_round(history, round, results, &model);
            ledger.merge(round_ledger);
            stats.merge(round_stats);

            rounds_completed = round;
            self.state = OrchestratorState::RoundComplete(round);
        }

        self.state = OrchestratorState::Finished;
        info!(
            rounds_completed,
            cancelled,
            agreements = ledger.len(),
            conversation_errors = stats.conversation_errors(&model),
            "negotiation finished"
        );

        Ok(NegotiationOutcome {
            ledger,
            stats,
            rounds_completed,
            cancelled,
        })
    }

    fn build_prompts(&self, history: &GameHistory, round: usize) -> Result<Vec<(Power, String)>> {
        history
            .active_powers()
            .iter()
            .map(|&power| {
                let agent = self.agents.get(&power).ok_or_else(|| EntenteError::Internal {
                    message: format!("no agent view for active power {power}"),
                })?;
                let prompt = self.renderer.render(agent, history, round, self.max_rounds)?;
                Ok((power, prompt))
            })
            .collect()
    }

    /// Fold one settled round into a fresh ledger/stats pair. Failures are
    /// soft: the power is skipped and the model's counter bumped.
    fn merge_round(
        &self,
        history: &mut GameHistory,
        round: usize,
        results: Vec<(Power, Result<String>)>,
        model: &str,
    ) -> (AgreementLedger, ErrorStats) {
        let mut round_ledger = AgreementLedger::new();
        let mut round_stats = ErrorStats::new();

        for (power, result) in results {
            let contribution = match result.and_then(|reply| parse_reply(power, &reply)) {
                Ok(contribution) => contribution,
                Err(e) => {
                    warn!(%power, round, "conversation error: {e}");
                    round_stats.record_conversation_error(model);
                    continue;
                }
            };

            debug!(
                %power,
                round,
                messages = contribution.messages.len(),
                proposals = contribution.proposals.len(),
                "merged contribution"
            );
            for message in contribution.messages {
                history.push_message(message);
            }
            for (recipient, statement) in contribution.proposals {
                round_ledger.record(power, recipient, statement);
            }
        }

        (round_ledger, round_stats)
    }
}
