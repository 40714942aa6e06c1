//! Round data and the round lifecycle.
//!
//! [`Round`] holds the pure bookkeeping for one question: who may answer, who
//! is being waited on, what has been answered, and whether the result has
//! been announced. It performs no I/O; the machine wraps it in the round lock.
//!
//! [`RoundLifecycle`] tracks the phase of the round slot and keeps an audit
//! log of every phase change:
//!
//! ```text
//! Idle    → Open
//! Open    → Open (replaced) | Closing (announced)
//! Closing → Open (replaced)
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Rejection;
use crate::ids::{Participant, UserId};
use crate::notices;

/// Phase of the round slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No round has been opened yet.
    Idle,
    /// A question is out and answers are being collected.
    Open,
    /// Everyone answered and the announcement has fired.
    Closing,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

fn is_legal_transition(from: RoundPhase, to: RoundPhase) -> bool {
    use RoundPhase::*;

    matches!(
        (from, to),
        (Idle, Open) | (Open, Open) | (Open, Closing) | (Closing, Open)
    )
}

/// A single recorded phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RoundPhase,
    pub to: RoundPhase,
    /// Generation of the round the transition belongs to.
    pub generation: u64,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal round transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: RoundPhase,
    pub to: RoundPhase,
}

/// Transitions retained in the audit log.
const MAX_TRANSITIONS: usize = 256;

/// Phase tracker with a bounded transition log.
#[derive(Debug, Clone)]
pub struct RoundLifecycle {
    current: RoundPhase,
    transitions: Vec<TransitionRecord>,
}

impl RoundLifecycle {
    pub fn new() -> Self {
        Self {
            current: RoundPhase::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> RoundPhase {
        self.current
    }

    /// Move to `to` if the edge is legal, recording it.
    pub fn advance(
        &mut self,
        to: RoundPhase,
        generation: u64,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, generation, "Round transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            generation,
            at: Utc::now(),
            reason: reason.map(String::from),
        });
        if self.transitions.len() > MAX_TRANSITIONS {
            let excess = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..excess);
        }
        self.current = to;
        Ok(())
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for RoundLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// What recording an answer led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEffect {
    /// Answer stored; others are still outstanding (or already announced).
    Recorded,
    /// This answer completed the roster. Carries the announcement text.
    Announce(String),
}

/// One question and its answer bookkeeping.
#[derive(Debug, Clone)]
pub struct Round {
    generation: u64,
    question: String,
    participants: Vec<Participant>,
    answers: HashMap<UserId, String>,
    waiting: HashSet<UserId>,
    announced: bool,
    opened_at: DateTime<Utc>,
}

impl Round {
    pub fn new(generation: u64, question: &str, participants: Vec<Participant>) -> Self {
        Self {
            generation,
            question: question.to_string(),
            participants,
            answers: HashMap::new(),
            waiting: HashSet::new(),
            announced: false,
            opened_at: Utc::now(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.id == user)
    }

    pub fn is_waiting(&self, user: UserId) -> bool {
        self.waiting.contains(&user)
    }

    pub fn answer(&self, user: UserId) -> Option<&str> {
        self.answers.get(&user).map(String::as_str)
    }

    /// Users currently being waited on, sorted.
    pub fn waiting(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.waiting.iter().copied().collect();
        users.sort();
        users
    }

    /// Users whose answer is currently held, in roster order.
    pub fn answered(&self) -> Vec<UserId> {
        self.participants
            .iter()
            .map(|p| p.id)
            .filter(|id| self.answers.contains_key(id))
            .collect()
    }

    /// Admit `user` into the waiting set.
    pub fn admit(&mut self, user: UserId) -> Result<(), Rejection> {
        if !self.is_participant(user) {
            return Err(Rejection::NotATarget);
        }
        if !self.waiting.insert(user) {
            return Err(Rejection::AlreadyWaiting);
        }
        Ok(())
    }

    /// Move `user` from waiting to answered. When this completes the roster
    /// for the first time, flips `announced`, builds the announcement, and
    /// clears the answers.
    pub fn record_answer(&mut self, user: UserId, text: &str) -> Result<AnswerEffect, Rejection> {
        if !self.waiting.remove(&user) {
            return Err(Rejection::Stale);
        }
        self.answers.insert(user, text.to_string());

        if self.announced || !self.everyone_answered() {
            return Ok(AnswerEffect::Recorded);
        }

        self.announced = true;
        let content = notices::announcement(
            &self.question,
            self.participants.iter().map(|p| {
                (
                    p.display_name.as_str(),
                    self.answers.get(&p.id).map(String::as_str).unwrap_or_default(),
                )
            }),
        );
        self.answers.clear();
        Ok(AnswerEffect::Announce(content))
    }

    /// Drop `user` from the waiting set without touching answers. Returns
    /// whether the user was waiting.
    pub fn abandon(&mut self, user: UserId) -> bool {
        self.waiting.remove(&user)
    }

    fn everyone_answered(&self) -> bool {
        self.participants
            .iter()
            .all(|p| self.answers.contains_key(&p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: UserId = UserId(1);
    const B: UserId = UserId(2);
    const OUTSIDER: UserId = UserId(99);

    fn round() -> Round {
        Round::new(
            1,
            "What made you smile today?",
            vec![Participant::new(1, "Ann"), Participant::new(2, "Bo")],
        )
    }

    #[test]
    fn test_admit_rejects_non_participant() {
        let mut round = round();
        assert_eq!(round.admit(OUTSIDER), Err(Rejection::NotATarget));
        assert!(round.waiting().is_empty());
    }

    #[test]
    fn test_admit_twice_is_rejected() {
        let mut round = round();
        round.admit(A).unwrap();
        assert_eq!(round.admit(A), Err(Rejection::AlreadyWaiting));
        assert_eq!(round.waiting(), vec![A]);
    }

    #[test]
    fn test_first_answer_does_not_announce() {
        let mut round = round();
        round.admit(A).unwrap();

        assert_eq!(round.record_answer(A, "sunshine"), Ok(AnswerEffect::Recorded));
        assert_eq!(round.answer(A), Some("sunshine"));
        assert!(!round.is_waiting(A));
        assert!(!round.is_announced());
    }

    #[test]
    fn test_last_answer_announces_once_and_clears() {
        let mut round = round();
        round.admit(A).unwrap();
        round.admit(B).unwrap();
        round.record_answer(B, "coffee").unwrap();

        let effect = round.record_answer(A, "sunshine").unwrap();
        let AnswerEffect::Announce(text) = effect else {
            panic!("expected announcement");
        };
        let ann = text.find("Ann's answer: sunshine").unwrap();
        let bo = text.find("Bo's answer: coffee").unwrap();
        assert!(ann < bo);
        assert!(round.is_announced());
        assert!(round.answered().is_empty());

        // A re-answer after the announcement is stored but never re-announced
        round.admit(A).unwrap();
        round.admit(B).unwrap();
        assert_eq!(round.record_answer(A, "again"), Ok(AnswerEffect::Recorded));
        assert_eq!(round.record_answer(B, "again"), Ok(AnswerEffect::Recorded));
    }

    #[test]
    fn test_answer_without_waiting_is_stale() {
        let mut round = round();
        assert_eq!(round.record_answer(A, "late"), Err(Rejection::Stale));
        assert_eq!(round.answer(A), None);
    }

    #[test]
    fn test_abandon_leaves_answers() {
        let mut round = round();
        round.admit(A).unwrap();
        round.record_answer(A, "first").unwrap();
        round.admit(A).unwrap();

        assert!(round.abandon(A));
        assert!(!round.abandon(A));
        assert_eq!(round.answer(A), Some("first"));
        assert_eq!(round.record_answer(A, "late"), Err(Rejection::Stale));
    }

    #[test]
    fn test_lifecycle_legal_path() {
        let mut lifecycle = RoundLifecycle::new();
        lifecycle.advance(RoundPhase::Open, 1, Some("opened")).unwrap();
        lifecycle.advance(RoundPhase::Closing, 1, None).unwrap();
        lifecycle.advance(RoundPhase::Open, 2, None).unwrap();
        lifecycle.advance(RoundPhase::Open, 3, Some("replaced")).unwrap();

        assert_eq!(lifecycle.current(), RoundPhase::Open);
        assert_eq!(lifecycle.transitions().len(), 4);
        assert_eq!(lifecycle.transitions()[0].reason.as_deref(), Some("opened"));
    }

    #[test]
    fn test_lifecycle_rejects_illegal_edge() {
        let mut lifecycle = RoundLifecycle::new();
        let err = lifecycle.advance(RoundPhase::Closing, 0, None).unwrap_err();
        assert_eq!(err.to_string(), "Illegal round transition: Idle → Closing");
        assert_eq!(lifecycle.current(), RoundPhase::Idle);

        // A round never goes back to Idle once one has been opened
        lifecycle.advance(RoundPhase::Open, 1, None).unwrap();
        lifecycle.advance(RoundPhase::Closing, 1, None).unwrap();
        assert!(lifecycle.advance(RoundPhase::Idle, 1, None).is_err());
        assert_eq!(lifecycle.current(), RoundPhase::Closing);
    }

    #[test]
    fn test_lifecycle_log_is_bounded() {
        let mut lifecycle = RoundLifecycle::new();
        for generation in 0..(MAX_TRANSITIONS as u64 + 10) {
            lifecycle.advance(RoundPhase::Open, generation, None).unwrap();
        }
        assert_eq!(lifecycle.transitions().len(), MAX_TRANSITIONS);
        assert_eq!(
            lifecycle.transitions().last().unwrap().generation,
            MAX_TRANSITIONS as u64 + 9
        );
    }
}
