//! Inbound chat events, one JSON object per line.
//!
//! ```text
//! {"type":"answer_pressed","user_id":"111"}
//! {"type":"private_message","user_id":"111","content":"...","author_is_bot":false}
//! ```
//!
//! Ids may be JSON numbers or strings (Discord serialises snowflakes as
//! strings). Malformed lines are logged and skipped.

use std::sync::Arc;

use round_coordination::{Rejection, ReplyRouting, RoundMachine, UserId};
use serde::{Deserialize, Deserializer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Someone pressed the answer button under the question.
    AnswerPressed {
        #[serde(deserialize_with = "snowflake")]
        user_id: UserId,
    },
    /// A message arrived in a private conversation with the bot.
    PrivateMessage {
        #[serde(deserialize_with = "snowflake")]
        user_id: UserId,
        content: String,
        #[serde(default)]
        author_is_bot: bool,
    },
}

fn snowflake<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(id) => Ok(UserId(id)),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map(UserId)
            .map_err(serde::de::Error::custom),
    }
}

/// Parse one line; blank lines yield `None`.
pub fn parse_event(line: &str) -> Result<Option<InboundEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// What the machine did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    SessionStarted,
    Rejected(Rejection),
    Reply(ReplyRouting),
    /// Authored by a bot (including this one); dropped.
    Ignored,
}

/// Hand one event to the machine. Answer sessions and notices run detached,
/// so a slow delivery never stalls the next event.
pub async fn dispatch(machine: &Arc<RoundMachine>, event: InboundEvent) -> Dispatch {
    match event {
        InboundEvent::AnswerPressed { user_id } => match machine.begin_answer(user_id).await {
            Ok(_session) => Dispatch::SessionStarted,
            Err(rejection) => Dispatch::Rejected(rejection),
        },
        InboundEvent::PrivateMessage {
            author_is_bot: true,
            ..
        } => Dispatch::Ignored,
        InboundEvent::PrivateMessage {
            user_id, content, ..
        } => Dispatch::Reply(machine.handle_private_message(user_id, &content).await),
    }
}

/// Read events from `reader` until EOF or cancellation.
pub async fn run_event_loop<R>(machine: Arc<RoundMachine>, reader: R, cancel: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Event stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read event stream");
                    break;
                }
            },
        };

        match parse_event(&line) {
            Ok(Some(event)) => {
                let outcome = dispatch(&machine, event).await;
                debug!(?outcome, "Event dispatched");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, line = %line, "Skipping malformed event"),
        }
    }
}
