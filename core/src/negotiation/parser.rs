//! Negotiation reply parser
//!
//! Extracts the structured negotiation payload from arbitrary model output.
//! This is intentionally defensive because some models/proxies produce:
//! - fenced JSON blocks (```json ... ```)
//! - JSON embedded in surrounding prose
//! - invalid JSON with literal newlines inside string values

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::error::{EntenteError, Result};
use crate::history::{Message, Recipient};
use crate::power::Power;

/// Wire shape of a reply. Both arrays default so a model may send either
/// half alone; an object with neither key is not treated as a reply at all.
#[derive(Debug, Default, Deserialize)]
struct ReplyPayload {
    #[serde(default)]
    messages: Vec<ReplyMessage>,
    #[serde(default)]
    agreements: Vec<ReplyAgreement>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    recipient: String,
    #[serde(alias = "message")]
    body: String,
}

#[derive(Debug, Deserialize)]
struct ReplyAgreement {
    recipient: String,
    statement: String,
}

/// One power's successfully parsed output for a round.
#[derive(Debug, Default)]
pub struct Contribution {
    pub messages: Vec<Message>,
    /// (recipient, statement) pairs; the sender is implicit.
    pub proposals: Vec<(Power, String)>,
}

impl Contribution {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.proposals.is_empty()
    }
}

/// Parse one model reply into `sender`'s contribution for the round.
///
/// Recovery ladder: fenced ```json blocks first, then the whole trimmed
/// body, then any balanced JSON object found in the text; each candidate
/// is retried with literal newlines inside strings escaped. Failure to
/// find any candidate is [`EntenteError::UnparseableReply`] — a soft fault
/// for this power/round, never for the session.
///
/// Items whose recipient does not normalize to a power (or, for
/// agreements, names the broadcast channel) are dropped with a warning;
/// one bad item does not poison an otherwise usable reply.
pub fn parse_reply(sender: Power, content: &str) -> Result<Contribution> {
    let payload = extract_payload(content).ok_or(EntenteError::UnparseableReply {
        length: content.len(),
    })?;

    let mut contribution = Contribution::default();

    for item in payload.messages {
        match Recipient::try_from(item.recipient.clone()) {
            Ok(recipient) => {
                contribution
                    .messages
                    .push(Message::new(sender, recipient, item.body));
            }
            Err(_) => {
                warn!(%sender, recipient = %item.recipient, "dropping message to unknown recipient");
            }
        }
    }

    for item in payload.agreements {
        match Power::normalize(&item.recipient) {
            Ok(recipient) => contribution.proposals.push((recipient, item.statement)),
            Err(_) => {
                warn!(%sender, recipient = %item.recipient, "dropping agreement with unknown recipient");
            }
        }
    }

    Ok(contribution)
}

fn extract_payload(content: &str) -> Option<ReplyPayload> {
    // 1. Fenced JSON blocks first (most explicit)
    for block in extract_json_code_fence_blocks(content) {
        if let Some(payload) = parse_candidate(&block) {
            return Some(payload);
        }
    }

    // 2. The whole trimmed content
    if let Some(payload) = parse_candidate(content.trim()) {
        return Some(payload);
    }

    // 3. Balanced JSON objects embedded in prose
    for candidate in extract_balanced_json_objects(content) {
        if let Some(payload) = parse_candidate(&candidate) {
            return Some(payload);
        }
    }

    None
}

fn parse_candidate(candidate: &str) -> Option<ReplyPayload> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(payload) = parse_reply_object(trimmed) {
        return Some(payload);
    }

    // Some models output invalid JSON with literal newlines inside string
    // values. Normalize and try again.
    let normalized = escape_unescaped_newlines_in_json_strings(trimmed);
    parse_reply_object(&normalized)
}

/// Accept only objects that actually carry a negotiation key; otherwise
/// any `{...}` fragment inside the reply would deserialize to an empty
/// payload and mask the real one.
fn parse_reply_object(candidate: &str) -> Option<ReplyPayload> {
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    if !obj.contains_key("messages") && !obj.contains_key("agreements") {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Extract ```json ... ``` blocks.
///
/// The closing fence must be a line that is exactly ``` (plus whitespace),
/// so occurrences of ``` inside JSON string values won't truncate.
fn extract_json_code_fence_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let lower = content.to_lowercase();
    let mut search_from = 0usize;

    let end_fence_re = Regex::new(r"(?m)^[ \t]*```[ \t]*$").expect("valid regex");

    while let Some(rel_start) = lower[search_from..].find("```json") {
        let fence_start = search_from + rel_start;
        let after_tag = fence_start + "```json".len();

        let content_start = match content[after_tag..].find('\n') {
            Some(rel_nl) => after_tag + rel_nl + 1,
            None => break,
        };

        let hay = &content[content_start..];
        if let Some(m) = end_fence_re.find(hay) {
            let end_fence_start = content_start + m.start();
            blocks.push(content[content_start..end_fence_start].to_string());
            search_from = content_start + m.end();
        } else {
            break;
        }
    }

    blocks
}

/// Extract top-level `{ ... }` candidates by brace balancing.
///
/// Respects JSON strings and escapes, so braces inside strings don't
/// affect balancing.
fn extract_balanced_json_objects(content: &str) -> Vec<String> {
    let mut out = Vec::new();

    let mut in_string = false;
    let mut escape = false;
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;

    for (i, ch) in content.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            out.push(content[s..=i].to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    out
}

/// Convert invalid JSON containing literal newlines inside string values
/// into valid JSON. Only escapes `\n`/`\r` when inside a string literal.
fn escape_unescaped_newlines_in_json_strings(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in input.chars() {
        if in_string {
            if escape {
                out.push(ch);
                escape = false;
                continue;
            }
            match ch {
                '\\' => {
                    out.push(ch);
                    escape = true;
                }
                '"' => {
                    out.push(ch);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(ch),
            }
        } else {
            out.push(ch);
            if ch == '"' {
                in_string = true;
            }
        }
    }

    out
}
