//! Answer session: one participant's timed private exchange.
//!
//! ```text
//! round already replaced ──→ expiry notice, Orphaned
//! send private prompt ──fail──→ withdraw, PromptUndeliverable
//!        │
//!   wait for reply ─┬─ reply      → complete_answer, confirm → Answered
//!                   ├─ timeout    → abandon_answer           → TimedOut
//!                   └─ round gone → expiry notice            → Orphaned
//! ```
//!
//! The session only ever consumes one reply: its reply slot is a oneshot
//! channel that the machine removes when routing the message.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::machine::RoundMachine;
use super::{Rejection, RoundError};
use crate::delivery::Recipient;
use crate::ids::UserId;
use crate::notices;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Reply recorded. `announced` is set if it completed the roster.
    Answered { announced: bool },
    /// Reply recorded, but the announcement it triggered could not be sent.
    AnnouncementFailed,
    /// No reply before the timeout.
    TimedOut,
    /// A newer round replaced the one this session belonged to.
    Orphaned,
    /// The machine refused the reply.
    Rejected(Rejection),
    /// The private prompt could not be delivered.
    PromptUndeliverable,
}

/// Everything a session needs, handed out by the machine on admission.
pub(crate) struct SessionTicket {
    pub user: UserId,
    pub generation: u64,
    pub question: String,
    pub reply: oneshot::Receiver<String>,
    pub cancel: CancellationToken,
}

enum Wait {
    Reply(String),
    TimedOut,
    Cancelled,
}

pub struct AnswerSession {
    machine: Arc<RoundMachine>,
    ticket: SessionTicket,
    timeout: Duration,
}

impl AnswerSession {
    pub(crate) fn new(
        machine: Arc<RoundMachine>,
        ticket: SessionTicket,
        timeout: Duration,
    ) -> Self {
        Self {
            machine,
            ticket,
            timeout,
        }
    }

    pub async fn run(self) -> SessionOutcome {
        let Self {
            machine,
            ticket,
            timeout,
        } = self;
        let SessionTicket {
            user,
            generation,
            question,
            reply,
            cancel,
        } = ticket;

        if cancel.is_cancelled() {
            info!(%user, generation, "Round replaced before the answer prompt went out");
            machine.notify(user, notices::answer_expired()).await;
            return SessionOutcome::Orphaned;
        }

        if let Err(e) = machine
            .gateway()
            .send_text(Recipient::Direct(user), notices::answer_prompt(&question))
            .await
        {
            warn!(%user, generation, error = %e, "Could not deliver answer prompt");
            machine.withdraw(generation, user).await;
            return SessionOutcome::PromptUndeliverable;
        }

        let wait = tokio::select! {
            biased;
            _ = cancel.cancelled() => Wait::Cancelled,
            received = tokio::time::timeout(timeout, reply) => match received {
                Ok(Ok(text)) => Wait::Reply(text),
                // Reply slot dropped: the round was replaced.
                Ok(Err(_)) => Wait::Cancelled,
                Err(_) => Wait::TimedOut,
            },
        };

        match wait {
            Wait::Reply(text) => match machine.complete_answer(generation, user, &text).await {
                Ok(completion) => {
                    machine.notify(user, notices::answer_recorded()).await;
                    SessionOutcome::Answered {
                        announced: completion.announced,
                    }
                }
                Err(RoundError::Rejected(rejection)) => {
                    // The round was replaced between the reply and its recording.
                    info!(%user, generation, %rejection, "Reply rejected");
                    machine.notify(user, notices::answer_expired()).await;
                    SessionOutcome::Rejected(rejection)
                }
                Err(e) => {
                    error!(
                        %user,
                        generation,
                        error = %e,
                        "Answer recorded but announcement failed"
                    );
                    machine.notify(user, notices::answer_recorded()).await;
                    SessionOutcome::AnnouncementFailed
                }
            },
            Wait::TimedOut => match machine.abandon_answer(generation, user).await {
                Ok(()) => SessionOutcome::TimedOut,
                Err(_) => SessionOutcome::Orphaned,
            },
            Wait::Cancelled => {
                info!(%user, generation, "Answer session orphaned by a newer round");
                machine.notify(user, notices::answer_expired()).await;
                SessionOutcome::Orphaned
            }
        }
    }
}
