//! The round state machine.
//!
//! All round state (`waiting`, `answers`, `announced`, the reply slots of
//! waiting sessions, and the cancellation token of the live round) sits in a
//! single [`RoundSlot`] behind one async mutex. Every check-then-mutate step
//! runs under that lock; sends always happen after it is released.
//!
//! ```text
//! open_round()        generate → append history → install round → broadcast
//! begin_answer(u)     admit u (lock) → spawn AnswerSession
//! private reply       route to u's reply slot (lock)
//! complete_answer(u)  record (lock) → announce if roster complete
//! abandon_answer(u)   drop u from waiting (lock) → timeout notice
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{AnswerSession, SessionOutcome, SessionTicket};
use super::state::{AnswerEffect, Round, RoundLifecycle, RoundPhase, TransitionRecord};
use super::{Rejection, RoundResult};
use crate::delivery::{DeliveryGateway, OutgoingMessage, Recipient};
use crate::history::HistoryStore;
use crate::ids::{ChannelId, Participant, UserId};
use crate::notices;
use crate::prompt::{PromptStyle, QuestionGenerator, QuestionPrompt};

/// How long a session waits for the private reply.
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// How many past questions are shown to the generator.
pub const DEFAULT_HISTORY_CONTEXT: usize = 100;

/// Static configuration of the round machine.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Fixed roster, in announcement order.
    pub participants: Vec<Participant>,
    /// Shared channel for questions and announcements.
    pub broadcast: ChannelId,
    pub answer_timeout: Duration,
    pub history_context: usize,
    /// Local time zone used to pick the day's category.
    pub utc_offset: FixedOffset,
    pub prompt_style: PromptStyle,
}

impl RoundConfig {
    pub fn new(participants: Vec<Participant>, broadcast: ChannelId) -> Self {
        Self {
            participants,
            broadcast,
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            history_context: DEFAULT_HISTORY_CONTEXT,
            utc_offset: Utc.fix(),
            prompt_style: PromptStyle::default(),
        }
    }

    fn is_participant(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.id == user)
    }
}

/// Result of one `open_round` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new round is live and its question was broadcast.
    Opened { generation: u64, question: String },
    /// The generator produced nothing usable; a failure notice was broadcast.
    GenerationFailed { reason: String },
}

/// Result of a successful `complete_answer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Whether this answer triggered the announcement.
    pub announced: bool,
}

/// Where an inbound private message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRouting {
    /// Handed to the user's waiting session.
    Delivered,
    /// From a participant with no waiting session; a hint was sent.
    NotExpected,
    /// Not from a participant.
    Ignored,
}

/// Read-only snapshot of the round slot.
#[derive(Debug, Clone, Serialize)]
pub struct RoundStatus {
    pub phase: RoundPhase,
    pub generation: Option<u64>,
    pub question: Option<String>,
    pub answered: Vec<UserId>,
    pub waiting: Vec<UserId>,
    pub announced: bool,
    pub opened_at: Option<DateTime<Utc>>,
}

/// The single consistency unit guarded by the round lock.
struct RoundSlot {
    last_generation: u64,
    round: Option<Round>,
    /// Reply slot of every waiting session of the live round.
    replies: HashMap<UserId, oneshot::Sender<String>>,
    /// Cancelled when the live round is replaced.
    cancel: CancellationToken,
    lifecycle: RoundLifecycle,
}

impl RoundSlot {
    fn live(&mut self, generation: u64) -> Option<&mut Round> {
        self.round
            .as_mut()
            .filter(|round| round.generation() == generation)
    }
}

/// Owns the live round and coordinates its answer sessions.
pub struct RoundMachine {
    config: RoundConfig,
    history: Arc<HistoryStore>,
    generator: Arc<dyn QuestionGenerator>,
    gateway: DeliveryGateway,
    slot: Mutex<RoundSlot>,
}

impl RoundMachine {
    pub fn new(
        config: RoundConfig,
        history: Arc<HistoryStore>,
        generator: Arc<dyn QuestionGenerator>,
        gateway: DeliveryGateway,
    ) -> Self {
        Self {
            config,
            history,
            generator,
            gateway,
            slot: Mutex::new(RoundSlot {
                last_generation: 0,
                round: None,
                replies: HashMap::new(),
                cancel: CancellationToken::new(),
                lifecycle: RoundLifecycle::new(),
            }),
        }
    }

    /// Create a shared reference to this machine
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn gateway(&self) -> &DeliveryGateway {
        &self.gateway
    }

    fn broadcast(&self) -> Recipient {
        Recipient::Channel(self.config.broadcast)
    }

    /// Open a round for the current local date.
    pub async fn open_round(&self) -> RoundResult<OpenOutcome> {
        let now = Utc::now().with_timezone(&self.config.utc_offset);
        self.open_round_at(now).await
    }

    /// Open a round as if the local time were `now`.
    ///
    /// On generator failure only a notice is broadcast: no history write, and
    /// any previous round stays in place.
    pub async fn open_round_at(&self, now: DateTime<FixedOffset>) -> RoundResult<OpenOutcome> {
        let recent = self.history.recent_ascending(self.config.history_context)?;
        let prompt = QuestionPrompt::for_date(&now, recent, self.config.prompt_style.clone());

        info!(
            day = prompt.day,
            category = %prompt.category,
            recent = prompt.recent.len(),
            "Generating question"
        );

        let question = match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => return self.report_generation_failure("empty response").await,
            Err(e) => return self.report_generation_failure(&e.to_string()).await,
        };

        self.history.append(&question)?;

        let generation = {
            let mut guard = self.slot.lock().await;
            let slot = &mut *guard;

            slot.cancel.cancel();
            let orphaned = slot.replies.len();
            slot.replies.clear();
            slot.cancel = CancellationToken::new();

            slot.last_generation += 1;
            let generation = slot.last_generation;
            slot.round = Some(Round::new(
                generation,
                &question,
                self.config.participants.clone(),
            ));
            if let Err(e) = slot
                .lifecycle
                .advance(RoundPhase::Open, generation, Some("question generated"))
            {
                warn!(error = %e, "Unexpected round transition");
            }
            if orphaned > 0 {
                info!(orphaned, generation, "Previous round's sessions cancelled");
            }
            generation
        };

        info!(generation, question = %question, "Round opened");

        let message =
            OutgoingMessage::text(notices::question_broadcast(&question)).with_answer_button();
        self.gateway.send(self.broadcast(), &message).await?;

        Ok(OpenOutcome::Opened {
            generation,
            question,
        })
    }

    async fn report_generation_failure(&self, reason: &str) -> RoundResult<OpenOutcome> {
        warn!(reason, "Question generation failed, round skipped");
        self.gateway
            .send_text(self.broadcast(), notices::generation_failed())
            .await?;
        Ok(OpenOutcome::GenerationFailed {
            reason: reason.to_string(),
        })
    }

    /// Start an answer session for `user`.
    ///
    /// Rejections are reported to the user directly and leave state untouched.
    pub async fn begin_answer(
        self: &Arc<Self>,
        user: UserId,
    ) -> Result<JoinHandle<SessionOutcome>, Rejection> {
        let admitted = {
            let mut guard = self.slot.lock().await;
            let slot = &mut *guard;

            match slot.round.as_mut() {
                None => Err(Rejection::NoActiveRound),
                Some(round) => round.admit(user).map(|()| {
                    let (reply_tx, reply_rx) = oneshot::channel();
                    slot.replies.insert(user, reply_tx);
                    SessionTicket {
                        user,
                        generation: round.generation(),
                        question: round.question().to_string(),
                        reply: reply_rx,
                        cancel: slot.cancel.clone(),
                    }
                }),
            }
        };

        match admitted {
            Ok(ticket) => {
                info!(%user, generation = ticket.generation, "Answer session started");
                let session = AnswerSession::new(self.clone(), ticket, self.config.answer_timeout);
                Ok(tokio::spawn(session.run()))
            }
            Err(rejection) => {
                info!(%user, %rejection, "Answer activation rejected");
                self.notify_detached(user, rejection.notice());
                Err(rejection)
            }
        }
    }

    /// Route a private message from `user` to their waiting session.
    pub async fn handle_private_message(
        self: &Arc<Self>,
        user: UserId,
        text: &str,
    ) -> ReplyRouting {
        if !self.config.is_participant(user) {
            return ReplyRouting::Ignored;
        }

        let routed = {
            let mut guard = self.slot.lock().await;
            let slot = &mut *guard;

            let waiting = slot
                .round
                .as_ref()
                .is_some_and(|round| round.is_waiting(user));
            match slot.replies.remove(&user) {
                Some(reply) if waiting => reply.send(text.to_string()).is_ok(),
                _ => false,
            }
        };

        if routed {
            debug!(%user, "Private reply routed to session");
            ReplyRouting::Delivered
        } else {
            debug!(%user, "Private message with no waiting session");
            self.notify_detached(user, notices::reply_not_expected());
            ReplyRouting::NotExpected
        }
    }

    /// Record `user`'s answer for round `generation`, announcing when this
    /// completes the roster.
    pub async fn complete_answer(
        &self,
        generation: u64,
        user: UserId,
        text: &str,
    ) -> RoundResult<Completion> {
        let announcement = {
            let mut guard = self.slot.lock().await;
            let slot = &mut *guard;

            let round = slot.live(generation).ok_or(Rejection::Stale)?;
            let effect = round.record_answer(user, text)?;
            slot.replies.remove(&user);

            match effect {
                AnswerEffect::Recorded => None,
                AnswerEffect::Announce(content) => {
                    if let Err(e) = slot.lifecycle.advance(
                        RoundPhase::Closing,
                        generation,
                        Some("all participants answered"),
                    ) {
                        warn!(error = %e, "Unexpected round transition");
                    }
                    Some(content)
                }
            }
        };

        info!(%user, generation, "Answer recorded");

        let Some(content) = announcement else {
            return Ok(Completion { announced: false });
        };

        info!(generation, "All participants answered, announcing");
        if let Err(e) = self.gateway.send_text(self.broadcast(), content).await {
            error!(generation, error = %e, "Announcement delivery failed");
            return Err(e.into());
        }
        Ok(Completion { announced: true })
    }

    /// Drop `user`'s timed-out session from round `generation` and tell them.
    pub async fn abandon_answer(&self, generation: u64, user: UserId) -> Result<(), Rejection> {
        if !self.withdraw(generation, user).await {
            return Err(Rejection::Stale);
        }
        info!(%user, generation, "Answer session timed out");
        self.notify(user, notices::answer_timed_out()).await;
        Ok(())
    }

    /// Remove `user` from waiting without notifying. Returns whether they
    /// were waiting in round `generation`.
    pub(crate) async fn withdraw(&self, generation: u64, user: UserId) -> bool {
        let mut guard = self.slot.lock().await;
        let slot = &mut *guard;

        let removed = slot
            .live(generation)
            .is_some_and(|round| round.abandon(user));
        if removed {
            slot.replies.remove(&user);
        }
        removed
    }

    /// Best-effort direct message.
    pub(crate) async fn notify(&self, user: UserId, content: String) {
        if let Err(e) = self
            .gateway
            .send_text(Recipient::Direct(user), content)
            .await
        {
            warn!(%user, error = %e, "Failed to notify user");
        }
    }

    /// Best-effort direct message on its own task, so a notice stuck in
    /// rate-limit backoff never holds up the caller.
    fn notify_detached(self: &Arc<Self>, user: UserId, content: String) {
        let machine = Arc::clone(self);
        tokio::spawn(async move { machine.notify(user, content).await });
    }

    /// Snapshot of the round slot.
    pub async fn status(&self) -> RoundStatus {
        let slot = self.slot.lock().await;
        let phase = slot.lifecycle.current();
        match &slot.round {
            Some(round) => RoundStatus {
                phase,
                generation: Some(round.generation()),
                question: Some(round.question().to_string()),
                answered: round.answered(),
                waiting: round.waiting(),
                announced: round.is_announced(),
                opened_at: Some(round.opened_at()),
            },
            None => RoundStatus {
                phase,
                generation: None,
                question: None,
                answered: Vec::new(),
                waiting: Vec::new(),
                announced: false,
                opened_at: None,
            },
        }
    }

    /// Phase transition log, oldest first.
    pub async fn transitions(&self) -> Vec<TransitionRecord> {
        self.slot.lock().await.lifecycle.transitions().to_vec()
    }
}
