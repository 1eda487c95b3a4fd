//! Per-power negotiation context
//!
//! [`AgentView`] is the explicit, closed data type the orchestrator reads
//! for each power: goals, relationship labels toward the other powers, and
//! the private diary rendered verbatim into prompts. It is rebuilt from the
//! request payload at session start and never persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EntenteError, Result};
use crate::power::Power;

/// Wire shape of one power's `agent_state` entry. Every field defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStatePayload {
    #[serde(default)]
    pub goals: Vec<String>,
    /// power name -> relationship label (e.g. "ALLY", "ENEMY", "NEUTRAL")
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub diary: String,
}

/// Stateless per-power snapshot used to build negotiation prompts.
#[derive(Debug, Clone)]
pub struct AgentView {
    pub power: Power,
    pub goals: Vec<String>,
    pub relationships: BTreeMap<Power, String>,
    pub diary: String,
}

impl AgentView {
    /// Direct field mapping with defaulting. The only failure is a
    /// relationship entry keyed by something that is not a power.
    pub fn from_payload(power: Power, payload: AgentStatePayload) -> Result<Self> {
        let mut relationships = BTreeMap::new();
        for (name, label) in payload.relationships {
            let other = Power::normalize(&name).map_err(|_| EntenteError::InvalidAgentState {
                power: power.name().to_string(),
                reason: format!("relationship toward unknown power {name:?}"),
            })?;
            relationships.insert(other, label);
        }
        Ok(Self {
            power,
            goals: payload.goals,
            relationships,
            diary: payload.diary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_defaults() {
        let view = AgentView::from_payload(Power::France, AgentStatePayload::default()).unwrap();
        assert!(view.goals.is_empty());
        assert!(view.relationships.is_empty());
        assert!(view.diary.is_empty());
    }

    #[test]
    fn test_from_payload_normalizes_relationship_keys() {
        let payload = AgentStatePayload {
            goals: vec!["Hold Paris".to_string()],
            relationships: BTreeMap::from([("uk".to_string(), "ALLY".to_string())]),
            diary: "Trust no one.".to_string(),
        };
        let view = AgentView::from_payload(Power::France, payload).unwrap();
        assert_eq!(view.relationships.get(&Power::England).unwrap(), "ALLY");
    }

    #[test]
    fn test_from_payload_rejects_unknown_relationship_key() {
        let payload = AgentStatePayload {
            relationships: BTreeMap::from([("NARNIA".to_string(), "ENEMY".to_string())]),
            ..Default::default()
        };
        let err = AgentView::from_payload(Power::France, payload).unwrap_err();
        assert!(matches!(err, EntenteError::InvalidAgentState { .. }));
    }
}
