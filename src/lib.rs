//! Trading Assistant Core
//!
//! The conversational core of a stock-market simulator's AI assistant:
//! - Routes free text through an ordered command rule table
//! - Resolves tickers and market data across fallback providers
//! - Classifies voice transcripts into a UI intent taxonomy
//! - Records every turn in a durable session store
//!
//! PIPELINE:
//! TEXT → DISPATCH → (RESOLVE SYMBOL → FETCH QUOTE) → COMPOSE → PERSIST → REPLY

pub mod api;
pub mod chat;
pub mod composer;
pub mod dispatch;
pub mod error;
pub mod gemini;
pub mod market;
pub mod models;
pub mod sessions;
pub mod symbols;
pub mod voice;

pub use error::Result;

// Re-export common types
pub use chat::ChatService;
pub use models::*;
pub use voice::{Intent, IntentType};
