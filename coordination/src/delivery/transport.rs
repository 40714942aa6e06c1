//! Transport seam between the delivery gateway and the chat platform.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, UserId};

/// Where a message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// The shared broadcast channel.
    Channel(ChannelId),
    /// A user's private conversation.
    Direct(UserId),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel:{id}"),
            Self::Direct(id) => write!(f, "user:{id}"),
        }
    }
}

/// Interactive element attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    /// Button that starts an answer session for whoever presses it.
    AnswerButton,
}

/// Message content plus send options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affordance: Option<Affordance>,
}

impl OutgoingMessage {
    /// Plain text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            affordance: None,
        }
    }

    /// Attach the answer button.
    pub fn with_answer_button(mut self) -> Self {
        self.affordance = Some(Affordance::AnswerButton);
        self
    }
}

/// Platform acknowledgement of a delivered message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReceipt {
    pub message_id: Option<String>,
}

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The platform refused the message because of rate limiting. The message
    /// was not delivered.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The platform rejected the request outright.
    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request failed in flight; delivery state is unknown.
    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Sends one message to the chat platform, exactly once per call.
///
/// Implementations must report rate limiting as
/// [`TransportError::RateLimited`] and nothing else; the gateway retries only
/// that variant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        recipient: Recipient,
        message: &OutgoingMessage,
    ) -> Result<MessageReceipt, TransportError>;
}
