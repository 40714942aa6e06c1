//! Event bridge integration tests: NDJSON lines in, round behaviour out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use daily_question::{dispatch, run_event_loop, BotConfig, Dispatch, InboundEvent};
use round_coordination::{
    DeliveryGateway, GenerationError, HistoryStore, MessageReceipt, OutgoingMessage, Participant,
    QuestionGenerator, QuestionPrompt, Recipient, Rejection, ReplyRouting, RoundMachine,
    Transport, TransportError, UserId,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(Recipient, String)>>,
    rate_limits_left: AtomicU32,
}

impl Outbox {
    fn to(&self, recipient: Recipient) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == recipient)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for Outbox {
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
                retry_after: Some(Duration::from_secs(1)),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient, message.content.clone()));
        Ok(MessageReceipt::default())
    }
}

struct FixedQuestion;

#[async_trait]
impl QuestionGenerator for FixedQuestion {
    async fn generate(&self, _prompt: &QuestionPrompt) -> Result<String, GenerationError> {
        Ok("What did you dream about?".into())
    }
}

const CONFIG: &str = r#"
[discord]
token = "t"
channel_id = 10

[openai]
api_key = "k"

[[participants]]
id = 1
display_name = "Ann"

[[participants]]
id = 2
display_name = "Bo"
"#;

fn machine(outbox: Arc<Outbox>) -> Arc<RoundMachine> {
    let config = BotConfig::from_toml(CONFIG).unwrap();
    config.validate().unwrap();
    assert_eq!(
        config.participants,
        vec![Participant::new(1, "Ann"), Participant::new(2, "Bo")]
    );

    RoundMachine::new(
        config.round_config().unwrap(),
        Arc::new(HistoryStore::in_memory(100)),
        Arc::new(FixedQuestion),
        DeliveryGateway::new(outbox),
    )
    .shared()
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_drives_full_round() {
    let outbox = Arc::new(Outbox::default());
    let machine = machine(outbox.clone());
    machine.open_round().await.unwrap();

    let input = concat!(
        r#"{"type":"answer_pressed","user_id":"1"}"#,
        "\n",
        r#"{"type":"private_message","user_id":"1","content":"Flying over the sea"}"#,
        "\n",
        "this line is not json\n",
        "\n",
        r#"{"type":"private_message","user_id":"2","content":"echo","author_is_bot":true}"#,
        "\n",
        r#"{"type":"answer_pressed","user_id":2}"#,
        "\n",
        r#"{"type":"private_message","user_id":2,"content":"A cat that talks"}"#,
        "\n",
    );

    run_event_loop(machine.clone(), input.as_bytes(), CancellationToken::new()).await;

    // Let the detached sessions finish.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let channel = outbox.to(Recipient::Channel(round_coordination::ChannelId(10)));
    let announcements: Vec<_> = channel
        .iter()
        .filter(|c| c.contains("Everyone has answered"))
        .collect();
    assert_eq!(announcements.len(), 1);
    assert!(announcements[0].contains("Ann's answer: Flying over the sea"));
    assert!(announcements[0].contains("Bo's answer: A cat that talks"));

    // The bot-authored line never reached the machine
    assert!(!outbox
        .to(Recipient::Direct(UserId(2)))
        .iter()
        .any(|m| m.contains("Press the answer button")));
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_outcomes() {
    let outbox = Arc::new(Outbox::default());
    let machine = machine(outbox.clone());

    assert_eq!(
        dispatch(
            &machine,
            InboundEvent::AnswerPressed {
                user_id: UserId(1)
            }
        )
        .await,
        Dispatch::Rejected(Rejection::NoActiveRound)
    );

    machine.open_round().await.unwrap();

    assert_eq!(
        dispatch(
            &machine,
            InboundEvent::AnswerPressed {
                user_id: UserId(3)
            }
        )
        .await,
        Dispatch::Rejected(Rejection::NotATarget)
    );
    assert_eq!(
        dispatch(
            &machine,
            InboundEvent::AnswerPressed {
                user_id: UserId(1)
            }
        )
        .await,
        Dispatch::SessionStarted
    );
    assert_eq!(
        dispatch(
            &machine,
            InboundEvent::PrivateMessage {
                user_id: UserId(2),
                content: "early".into(),
                author_is_bot: false,
            }
        )
        .await,
        Dispatch::Reply(ReplyRouting::NotExpected)
    );
    assert_eq!(
        dispatch(
            &machine,
            InboundEvent::PrivateMessage {
                user_id: UserId(1),
                content: "mine".into(),
                author_is_bot: true,
            }
        )
        .await,
        Dispatch::Ignored
    );
    assert_eq!(
        dispatch(
            &machine,
            InboundEvent::PrivateMessage {
                user_id: UserId(1),
                content: "mine".into(),
                author_is_bot: false,
            }
        )
        .await,
        Dispatch::Reply(ReplyRouting::Delivered)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_loop_stops() {
    let outbox = Arc::new(Outbox::default());
    let machine = machine(outbox);
    let cancel = CancellationToken::new();
    cancel.cancel();

    // A reader that never yields a line
    let (_writer, reader) = tokio::io::duplex(64);
    run_event_loop(machine, tokio::io::BufReader::new(reader), cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_hint_does_not_stall_loop() {
    let outbox = Arc::new(Outbox::default());
    let machine = machine(outbox.clone());
    machine.open_round().await.unwrap();
    outbox.rate_limits_left.store(3, Ordering::SeqCst);

    let input = concat!(
        r#"{"type":"private_message","user_id":"2","content":"too early"}"#,
        "\n",
        r#"{"type":"answer_pressed","user_id":"1"}"#,
        "\n",
    );

    let started = tokio::time::Instant::now();
    run_event_loop(machine.clone(), input.as_bytes(), CancellationToken::new()).await;
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(machine.status().await.waiting, vec![UserId(1)]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(outbox
        .to(Recipient::Direct(UserId(2)))
        .iter()
        .any(|m| m.contains("Press the answer button")));
}
