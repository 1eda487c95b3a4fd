//! Entente core: negotiation orchestration for AI-driven Diplomacy powers
//!
//! One session = one `/negotiate` request: rebuild the game history,
//! construct a view per negotiating power, run a fixed number of
//! concurrent negotiation rounds against a language model, and hand back
//! the bilateral agreed statements plus per-model error counters.

pub mod agent;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod negotiation;
pub mod power;
pub mod prompt;
pub mod session;

// Re-exports for convenience
pub use config::ServerConfig;
pub use error::{EntenteError, Result};
pub use power::Power;
pub use session::{NegotiateRequest, NegotiateResponse, SessionService};
