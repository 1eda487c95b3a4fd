//! Negotiation prompt rendering
//!
//! One tera template per session, compiled once. The embedded default can
//! be replaced per request by a `negotiation.tera` file in the supplied
//! prompts directory. Rendering is deterministic for a given agent view
//! and history, so round prompts are reproducible in tests.

use std::path::Path;

use serde::Serialize;
use tera::Tera;

use crate::agent::AgentView;
use crate::error::Result;
use crate::history::GameHistory;

const TEMPLATE_NAME: &str = "negotiation.tera";

const DEFAULT_TEMPLATE: &str = r#"You are {{ power }}, negotiating in phase {{ phase }} of a game of Diplomacy.
This is negotiation round {{ round }} of {{ max_rounds }}.

{% if goals -%}
Your goals:
{% for goal in goals %}- {{ goal }}
{% endfor %}
{%- endif %}
{% if relationships -%}
Your current relationships:
{% for other, label in relationships %}- {{ other }}: {{ label }}
{% endfor %}
{%- endif %}
{% if diary -%}
Your private diary:
{{ diary }}

{% endif -%}
{% if history -%}
Messages you have seen so far:
{% for m in history %}[{{ m.sender }} -> {{ m.recipient }}] {{ m.body }}
{% endfor %}
{%- else -%}
No messages have been exchanged yet.
{%- endif %}

Reply with a single JSON object and nothing else:
{"messages": [{"recipient": "<POWER or GLOBAL>", "body": "<text>"}],
 "agreements": [{"recipient": "<POWER>", "statement": "<agreed statement>"}]}

Send messages to pursue your goals and propose agreements only where you
mean to honor them this phase. Either list may be empty.
"#;

#[derive(Serialize)]
struct HistoryLine<'a> {
    sender: &'a str,
    recipient: String,
    body: &'a str,
}

/// Compiled prompt template bound to one session.
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    /// Build with the embedded default template.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)?;
        Ok(Self { tera })
    }

    /// Build from `<dir>/negotiation.tera`, falling back to the default
    /// when the file does not exist.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(TEMPLATE_NAME);
        if !path.is_file() {
            tracing::debug!(dir = %dir.display(), "no negotiation.tera override, using default");
            return Self::new();
        }
        let source = std::fs::read_to_string(&path)?;
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, &source)?;
        Ok(Self { tera })
    }

    /// Render the prompt for one power in one round.
    pub fn render(
        &self,
        agent: &AgentView,
        history: &GameHistory,
        round: usize,
        max_rounds: usize,
    ) -> Result<String> {
        let visible: Vec<HistoryLine> = history
            .visible_messages(agent.power)
            .into_iter()
            .map(|m| HistoryLine {
                sender: m.sender.name(),
                recipient: m.recipient.to_string(),
                body: &m.message,
            })
            .collect();

        let relationships: std::collections::BTreeMap<&str, &str> = agent
            .relationships
            .iter()
            .map(|(p, label)| (p.name(), label.as_str()))
            .collect();

        let mut ctx = tera::Context::new();
        ctx.insert("power", agent.power.name());
        ctx.insert("phase", history.current_phase_name());
        ctx.insert("round", &round);
        ctx.insert("max_rounds", &max_rounds);
        ctx.insert("goals", &agent.goals);
        ctx.insert("relationships", &relationships);
        ctx.insert("diary", &agent.diary);
        ctx.insert("history", &visible);

        Ok(self.tera.render(TEMPLATE_NAME, &ctx)?)
    }
}
