//! Shared fakes for round integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use round_coordination::{
    ChannelId, DeliveryGateway, GenerationError, HistoryStore, MessageReceipt, OutgoingMessage,
    Participant, QuestionGenerator, QuestionPrompt, Recipient, RoundConfig, RoundMachine,
    Transport, TransportError, UserId,
};

pub const CHANNEL: ChannelId = ChannelId(500);
pub const ANN: UserId = UserId(1);
pub const BO: UserId = UserId(2);
pub const OUTSIDER: UserId = UserId(99);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Let detached tasks (notices, sessions) run up to their next wait.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Records every delivered message; can be told to rate-limit or refuse.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Recipient, OutgoingMessage)>>,
    rate_limits_left: AtomicU32,
    refuse_direct: AtomicBool,
    refuse_channel: AtomicBool,
}

impl RecordingTransport {
    pub fn rate_limit_next(&self, count: u32) {
        self.rate_limits_left.store(count, Ordering::SeqCst);
    }

    pub fn refuse_direct(&self, refuse: bool) {
        self.refuse_direct.store(refuse, Ordering::SeqCst);
    }

    pub fn refuse_channel(&self, refuse: bool) {
        self.refuse_channel.store(refuse, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Recipient, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn channel_messages(&self) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| matches!(r, Recipient::Channel(_)))
            .map(|(_, m)| m)
            .collect()
    }

    pub fn direct_messages(&self, user: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| *r == Recipient::Direct(user))
            .map(|(_, m)| m.content)
            .collect()
    }

    pub fn announcements(&self) -> Vec<String> {
        self.channel_messages()
            .into_iter()
            .map(|m| m.content)
            .filter(|c| c.contains("Everyone has answered"))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        recipient: Recipient,
        message: &OutgoingMessage,
    ) -> Result<MessageReceipt, TransportError> {
        let limited = self
            .rate_limits_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_millis(500)),
            });
        }

        let refuse = match recipient {
            Recipient::Direct(_) => self.refuse_direct.load(Ordering::SeqCst),
            Recipient::Channel(_) => self.refuse_channel.load(Ordering::SeqCst),
        };
        if refuse {
            return Err(TransportError::Rejected {
                status: 403,
                body: "Cannot send messages to this user".into(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient, message.clone()));
        Ok(MessageReceipt {
            message_id: Some(sent.len().to_string()),
        })
    }
}

/// Replays scripted results, then falls back to numbered questions.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<QuestionPrompt>>,
    counter: AtomicU32,
}

impl ScriptedGenerator {
    pub fn push(&self, result: Result<String, GenerationError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn prompts(&self) -> Vec<QuestionPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &QuestionPrompt) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Question {n}?"))
    }
}

pub struct Harness {
    pub machine: Arc<RoundMachine>,
    pub transport: Arc<RecordingTransport>,
    pub generator: Arc<ScriptedGenerator>,
    pub history: Arc<HistoryStore>,
}

pub fn harness() -> Harness {
    harness_with_history(HistoryStore::in_memory(100))
}

pub fn harness_with_history(history: HistoryStore) -> Harness {
    init_tracing();

    let transport = Arc::new(RecordingTransport::default());
    let generator = Arc::new(ScriptedGenerator::default());
    let history = Arc::new(history);

    let config = RoundConfig::new(
        vec![Participant::new(1, "Ann"), Participant::new(2, "Bo")],
        CHANNEL,
    );
    let machine = RoundMachine::new(
        config,
        history.clone(),
        generator.clone(),
        DeliveryGateway::new(transport.clone()),
    )
    .shared();

    Harness {
        machine,
        transport,
        generator,
        history,
    }
}
