//! Voice Ledger Assistant
//!
//! A voice-driven personal finance assistant that:
//! - Captures one spoken utterance per turn
//! - Asks a language oracle with a compact financial context
//! - Separates conversational replies from structured transaction directives
//! - Applies directives to the ledger atomically, re-validating every field
//! - Speaks a confirmation or a generic failure notice back
//!
//! TURN LOOP:
//! IDLE → LISTENING → THINKING → (SPEAKING | APPLYING → SPEAKING) → IDLE

pub mod api;
pub mod applicator;
pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod gemini;
pub mod intent;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod session;
pub mod speech;

pub use error::{AssistantError, Result};

// Re-export common types
pub use applicator::TransactionApplicator;
pub use intent::{parse_reply, Intent};
pub use models::*;
pub use session::{AssistantServices, AssistantSession, TurnKind, TurnOutcome, TurnState};
