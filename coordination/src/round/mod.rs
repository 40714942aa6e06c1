//! Round state machine and answer sessions.
//!
//! One [`RoundMachine`] owns the single live [`Round`]. Scheduled ticks open
//! rounds; button presses spawn [`AnswerSession`]s, which report back into
//! the machine under its round lock.

pub mod machine;
pub mod session;
pub mod state;

pub use machine::{
    Completion, OpenOutcome, ReplyRouting, RoundConfig, RoundMachine, RoundStatus,
    DEFAULT_ANSWER_TIMEOUT, DEFAULT_HISTORY_CONTEXT,
};
pub use session::{AnswerSession, SessionOutcome};
pub use state::{
    AnswerEffect, IllegalTransition, Round, RoundLifecycle, RoundPhase, TransitionRecord,
};

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryError;
use crate::history::HistoryError;
use crate::notices;

/// A protocol violation, rejected without touching round state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("user is not a target of this round")]
    NotATarget,

    #[error("user already has an answer session waiting")]
    AlreadyWaiting,

    #[error("no round is open")]
    NoActiveRound,

    #[error("submission does not match a waiting session of the live round")]
    Stale,
}

impl Rejection {
    /// Direct notice sent to the offending user.
    pub fn notice(self) -> String {
        match self {
            Self::NotATarget => notices::not_a_target(),
            Self::AlreadyWaiting => notices::already_waiting(),
            Self::NoActiveRound => notices::no_active_round(),
            Self::Stale => notices::reply_not_expected(),
        }
    }
}

/// Error type for round operations
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("Question history unavailable: {0}")]
    History(#[from] HistoryError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),
}

/// Result type for round operations
pub type RoundResult<T> = Result<T, RoundError>;
