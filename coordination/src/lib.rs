//! Round coordination for the daily question bot.
//!
//! This library provides:
//! - A bounded, optionally file-backed history of asked questions
//! - A delivery gateway that retries rate-limited sends with platform backoff
//! - The round state machine: one live round, one waiting session per user,
//!   exactly one announcement per round
//! - Timed answer sessions that collect each participant's private reply
//!
//! # Flow
//!
//! ```text
//! scheduler tick → RoundMachine::open_round
//!                    ├─ HistoryStore::recent_ascending
//!                    ├─ QuestionGenerator::generate
//!                    ├─ HistoryStore::append
//!                    └─ DeliveryGateway::send (question + answer button)
//! button press   → RoundMachine::begin_answer → AnswerSession
//! private reply  → RoundMachine::handle_private_message → session
//! last answer    → RoundMachine::complete_answer → announcement
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod delivery;
pub mod history;
pub mod ids;
pub mod notices;
pub mod prompt;
pub mod round;

// Re-export key identifier types
pub use ids::{ChannelId, Participant, UserId};

// Re-export key history types
pub use history::{HistoryEntry, HistoryError, HistoryResult, HistoryStore};

// Re-export key delivery types
pub use delivery::{
    Affordance, DeliveryError, DeliveryGateway, MessageReceipt, OutgoingMessage, Recipient,
    RetryDecision, RetryPolicy, Transport, TransportError,
};

// Re-export key prompt types
pub use prompt::{GenerationError, PromptStyle, QuestionCategory, QuestionGenerator, QuestionPrompt};

// Re-export key round types
pub use round::{
    AnswerSession, Completion, OpenOutcome, Rejection, ReplyRouting, RoundConfig, RoundError,
    RoundMachine, RoundPhase, RoundResult, RoundStatus, SessionOutcome,
};
