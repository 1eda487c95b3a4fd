//! LLM client boundary
//!
//! The orchestrator only sees [`NegotiationClient`]: one structured text
//! completion per power per round, which may fail or time out. The shipped
//! implementation is an OpenAI-compatible HTTP client; tests substitute
//! scripted stubs.

pub mod chat;
pub mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::power::Power;

pub use client::{LlmConfig, OpenAiClient};

/// Capability to request one negotiation reply from a language model.
///
/// Implementations must be safe to call concurrently: the orchestrator
/// fans one call per active power out within each round.
#[async_trait]
pub trait NegotiationClient: Send + Sync {
    /// Request a reply for `power` in negotiation round `round`.
    async fn send(&self, prompt: &str, power: Power, round: usize) -> Result<String>;

    /// Model identifier used for error-stat bookkeeping.
    fn model_name(&self) -> &str;
}
