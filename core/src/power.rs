//! The seven canonical Diplomacy powers
//!
//! All power names entering the system (request payloads, snapshot keys,
//! model replies) pass through [`Power::normalize`], which upper-cases,
//! trims, applies the alias table, and rejects anything left over.

use serde::{Deserialize, Serialize};

use crate::error::{EntenteError, Result};

/// One of the seven national identities in the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Power {
    Austria,
    England,
    France,
    Germany,
    Italy,
    Russia,
    Turkey,
}

/// Canonical iteration order. Prompt construction and round merging walk
/// powers in this order so sessions are reproducible regardless of the
/// order the request listed them in.
pub const POWERS: [Power; 7] = [
    Power::Austria,
    Power::England,
    Power::France,
    Power::Germany,
    Power::Italy,
    Power::Russia,
    Power::Turkey,
];

/// Alias table for free-form power names seen in the wild, including
/// model typos that recur often enough to be worth absorbing.
const ALIASES: [(&str, &str); 4] = [
    ("EGMANY", "GERMANY"),
    ("GERMAN", "GERMANY"),
    ("UK", "ENGLAND"),
    ("BRIT", "ENGLAND"),
];

impl Power {
    /// Normalize a free-form power name to a canonical member.
    ///
    /// Upper-cases and trims, applies the alias table, then matches the
    /// canonical set. Pure; the only failure is [`EntenteError::UnknownPower`].
    pub fn normalize(raw: &str) -> Result<Self> {
        let mut name = raw.trim().to_uppercase();
        if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == name) {
            name = (*canonical).to_string();
        }
        match name.as_str() {
            "AUSTRIA" => Ok(Power::Austria),
            "ENGLAND" => Ok(Power::England),
            "FRANCE" => Ok(Power::France),
            "GERMANY" => Ok(Power::Germany),
            "ITALY" => Ok(Power::Italy),
            "RUSSIA" => Ok(Power::Russia),
            "TURKEY" => Ok(Power::Turkey),
            _ => Err(EntenteError::UnknownPower {
                name: raw.to_string(),
            }),
        }
    }

    /// Canonical uppercase name, as used in wire formats and ledger keys.
    pub fn name(&self) -> &'static str {
        match self {
            Power::Austria => "AUSTRIA",
            Power::England => "ENGLAND",
            Power::France => "FRANCE",
            Power::Germany => "GERMANY",
            Power::Italy => "ITALY",
            Power::Russia => "RUSSIA",
            Power::Turkey => "TURKEY",
        }
    }
}

impl std::fmt::Display for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Power {
    type Err = EntenteError;

    fn from_str(s: &str) -> Result<Self> {
        Power::normalize(s)
    }
}

impl TryFrom<String> for Power {
    type Error = EntenteError;

    fn try_from(value: String) -> Result<Self> {
        Power::normalize(&value)
    }
}

impl From<Power> for String {
    fn from(power: Power) -> String {
        power.name().to_string()
    }
}
