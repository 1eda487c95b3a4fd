//! Read-only reconstruction of game history
//!
//! The request boundary hands us two nested structures: the engine's saved
//! game (consumed only for the current phase name and the power roster) and
//! the phase-by-phase negotiation history. Both are mapped into typed
//! records here. Every optional field defaults independently; the only
//! structural requirements are a `name` on each phase and a usable current
//! phase, so [`GameHistory::reconstruct`] fails precisely and nowhere else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EntenteError, Result};
use crate::power::Power;

/// Message recipient: a concrete power or the broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Recipient {
    Power(Power),
    Global,
}

impl Recipient {
    pub fn is_global(&self) -> bool {
        matches!(self, Recipient::Global)
    }
}

impl TryFrom<String> for Recipient {
    type Error = EntenteError;

    fn try_from(value: String) -> Result<Self> {
        if value.trim().eq_ignore_ascii_case("GLOBAL") {
            Ok(Recipient::Global)
        } else {
            Ok(Recipient::Power(Power::normalize(&value)?))
        }
    }
}

impl From<Recipient> for String {
    fn from(recipient: Recipient) -> String {
        match recipient {
            Recipient::Power(p) => p.name().to_string(),
            Recipient::Global => "GLOBAL".to_string(),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Power(p) => f.write_str(p.name()),
            Recipient::Global => f.write_str("GLOBAL"),
        }
    }
}

/// A single negotiation utterance. Immutable once created; ordering within
/// a phase is the position in the phase's message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Power,
    pub recipient: Recipient,
    #[serde(alias = "body")]
    pub message: String,
}

impl Message {
    pub fn new(sender: Power, recipient: Recipient, body: impl Into<String>) -> Self {
        Self {
            sender,
            recipient,
            message: body.into(),
        }
    }

    /// Whether this message is visible to `power` when building its prompt:
    /// sent by it, addressed to it, or broadcast.
    pub fn visible_to(&self, power: Power) -> bool {
        self.sender == power || self.recipient == Recipient::Power(power) || self.recipient.is_global()
    }
}

/// One step of game history. Finalized phases are append-only; the current
/// phase accumulates messages while negotiation runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub plans: BTreeMap<Power, String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub submitted_orders_by_power: BTreeMap<Power, Vec<String>>,
    #[serde(default)]
    pub orders_by_power: BTreeMap<Power, Vec<String>>,
    #[serde(default)]
    pub results_by_power: BTreeMap<Power, Vec<String>>,
    #[serde(default)]
    pub phase_summaries: BTreeMap<Power, String>,
    #[serde(default)]
    pub experience_updates: BTreeMap<Power, String>,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Wire shape of the `game_history` request field.
#[derive(Debug, Clone, Default, Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    phases: Vec<serde_json::Value>,
}

/// Session-scoped view of the game: finalized phases plus the mutable
/// current phase that negotiation messages append into.
#[derive(Debug, Clone)]
pub struct GameHistory {
    phases: Vec<Phase>,
    current_phase: String,
    active_powers: Vec<Power>,
}

impl GameHistory {
    /// Rebuild the history from the serialized snapshot pair.
    ///
    /// `active` is the set of negotiating powers (normalized upstream from
    /// the agent-state payload keys). When the saved game carries a power
    /// roster, every active power must appear in it.
    pub fn reconstruct(
        saved_game: &serde_json::Value,
        history: &serde_json::Value,
        mut active: Vec<Power>,
    ) -> Result<Self> {
        let payload: HistoryPayload =
            serde_json::from_value(history.clone()).map_err(|e| EntenteError::MalformedSnapshot {
                reason: format!("game_history: {e}"),
            })?;

        let mut phases = Vec::with_capacity(payload.phases.len());
        for (index, raw) in payload.phases.iter().enumerate() {
            if raw.get("name").and_then(|n| n.as_str()).is_none() {
                return Err(EntenteError::MalformedSnapshot {
                    reason: format!("phase {index} has no name"),
                });
            }
            let phase: Phase =
                serde_json::from_value(raw.clone()).map_err(|e| EntenteError::MalformedSnapshot {
                    reason: format!("phase {index}: {e}"),
                })?;
            phases.push(phase);
        }

        let current_phase = Self::current_phase_from(saved_game, &phases)?;
        Self::check_roster(saved_game, &active)?;
        active.sort();
        active.dedup();

        // Negotiation messages land in the current phase; make sure it exists.
        if phases.last().map(|p| p.name.as_str()) != Some(current_phase.as_str()) {
            phases.push(Phase::new(current_phase.clone()));
        }

        Ok(Self {
            phases,
            current_phase,
            active_powers: active,
        })
    }

    fn current_phase_from(saved_game: &serde_json::Value, phases: &[Phase]) -> Result<String> {
        if let Some(name) = saved_game.get("phase").and_then(|p| p.as_str()) {
            if !name.trim().is_empty() {
                return Ok(name.to_string());
            }
        }
        phases
            .last()
            .map(|p| p.name.clone())
            .ok_or(EntenteError::MalformedSnapshot {
                reason: "no current phase: saved_game.phase missing and history empty".to_string(),
            })
    }

    fn check_roster(saved_game: &serde_json::Value, active: &[Power]) -> Result<()> {
        let Some(roster) = saved_game.get("powers").and_then(|p| p.as_object()) else {
            return Ok(());
        };
        let mut known = Vec::with_capacity(roster.len());
        for name in roster.keys() {
            known.push(Power::normalize(name)?);
        }
        for power in active {
            if !known.contains(power) {
                return Err(EntenteError::MalformedSnapshot {
                    reason: format!("power {power} negotiates but is not in the saved game"),
                });
            }
        }
        Ok(())
    }

    pub fn current_phase_name(&self) -> &str {
        &self.current_phase
    }

    /// Active powers in canonical order.
    pub fn active_powers(&self) -> &[Power] {
        &self.active_powers
    }

    pub fn messages_in_phase(&self, name: &str) -> &[Message] {
        self.phases
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Append a negotiation message to the current phase.
    pub fn push_message(&mut self, message: Message) {
        // reconstruct() guarantees the current phase exists
        if let Some(phase) = self.phases.iter_mut().find(|p| p.name == self.current_phase) {
            phase.messages.push(message);
        }
    }

    /// All messages visible to `power`, session-wide, in phase order then
    /// send order. This is the history a negotiation prompt sees.
    pub fn visible_messages(&self, power: Power) -> Vec<&Message> {
        self.phases
            .iter()
            .flat_map(|p| p.messages.iter())
            .filter(|m| m.visible_to(power))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_power_game() -> serde_json::Value {
        json!({
            "phase": "S1901M",
            "powers": {"FRANCE": {}, "GERMANY": {}}
        })
    }

    #[test]
    fn test_reconstruct_defaults_optional_fields() {
        let history = json!({"phases": [{"name": "S1901M"}]});
        let gh = GameHistory::reconstruct(
            &two_power_game(),
            &history,
            vec![Power::France, Power::Germany],
        )
        .unwrap();

        assert_eq!(gh.current_phase_name(), "S1901M");
        assert!(gh.messages_in_phase("S1901M").is_empty());
        assert_eq!(gh.active_powers(), &[Power::France, Power::Germany]);
    }

    #[test]
    fn test_reconstruct_rejects_nameless_phase() {
        let history = json!({"phases": [{"plans": {}}]});
        let err =
            GameHistory::reconstruct(&two_power_game(), &history, vec![Power::France]).unwrap_err();
        assert!(matches!(err, EntenteError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_reconstruct_rejects_power_off_roster() {
        let history = json!({"phases": [{"name": "S1901M"}]});
        let err = GameHistory::reconstruct(&two_power_game(), &history, vec![Power::Turkey])
            .unwrap_err();
        assert!(matches!(err, EntenteError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_current_phase_falls_back_to_last_history_phase() {
        let history = json!({"phases": [{"name": "S1901M"}, {"name": "F1901M"}]});
        let gh =
            GameHistory::reconstruct(&json!({}), &history, vec![Power::France]).unwrap();
        assert_eq!(gh.current_phase_name(), "F1901M");
    }

    #[test]
    fn test_reconstruct_fails_with_no_phase_at_all() {
        let err =
            GameHistory::reconstruct(&json!({}), &json!({}), vec![Power::France]).unwrap_err();
        assert!(matches!(err, EntenteError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_message_visibility() {
        let to_germany = Message::new(
            Power::France,
            Recipient::Power(Power::Germany),
            "hold the line",
        );
        let broadcast = Message::new(Power::Italy, Recipient::Global, "peace in our time");

        assert!(to_germany.visible_to(Power::France));
        assert!(to_germany.visible_to(Power::Germany));
        assert!(!to_germany.visible_to(Power::Russia));
        assert!(broadcast.visible_to(Power::Turkey));
    }

    #[test]
    fn test_push_message_lands_in_current_phase() {
        let history = json!({"phases": [{"name": "S1901M"}]});
        let mut gh = GameHistory::reconstruct(
            &two_power_game(),
            &history,
            vec![Power::France, Power::Germany],
        )
        .unwrap();

        gh.push_message(Message::new(
            Power::France,
            Recipient::Power(Power::Germany),
            "DMZ in Burgundy?",
        ));
        assert_eq!(gh.messages_in_phase("S1901M").len(), 1);
        assert_eq!(gh.visible_messages(Power::Germany).len(), 1);
        assert!(gh.visible_messages(Power::Russia).is_empty());
    }

    #[test]
    fn test_message_accepts_body_alias() {
        let m: Message = serde_json::from_value(json!({
            "sender": "FRANCE",
            "recipient": "GLOBAL",
            "body": "hello all"
        }))
        .unwrap();
        assert_eq!(m.message, "hello all");
        assert!(m.recipient.is_global());
    }
}
