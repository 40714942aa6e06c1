//! Delivery gateway: sends through a [`Transport`], riding out rate limits.
//!
//! ```text
//! send()
//!   ├─ Ok                      → receipt
//!   ├─ RateLimited, budget left → sleep(hint | default), try again
//!   ├─ RateLimited, budget gone → RetriesExhausted
//!   └─ any other error          → Transport (no retry)
//! ```
//!
//! Only a rate-limit rejection proves the message was not delivered, so no
//! other failure is ever retried.

use std::sync::Arc;

use tracing::{debug, warn};

use super::retry::{RetryDecision, RetryPolicy};
use super::transport::{MessageReceipt, OutgoingMessage, Recipient, Transport, TransportError};

/// Error type for gateway sends
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery to {recipient} gave up after {attempts} rate-limited attempts")]
    RetriesExhausted {
        recipient: Recipient,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Delivery to {recipient} failed: {source}")]
    Transport {
        recipient: Recipient,
        #[source]
        source: TransportError,
    },
}

impl DeliveryError {
    /// The transport error that ended the send.
    pub fn transport_error(&self) -> &TransportError {
        match self {
            Self::RetriesExhausted { source, .. } | Self::Transport { source, .. } => source,
        }
    }
}

/// Result type for gateway sends
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Rate-limit aware sender shared by the round machine and its sessions.
#[derive(Clone)]
pub struct DeliveryGateway {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl DeliveryGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Deliver `message` to `recipient`.
    pub async fn send(
        &self,
        recipient: Recipient,
        message: &OutgoingMessage,
    ) -> DeliveryResult<MessageReceipt> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.transport.send(recipient, message).await {
                Ok(receipt) => {
                    debug!(%recipient, attempts, "Message delivered");
                    return Ok(receipt);
                }
                Err(TransportError::RateLimited { retry_after }) => {
                    match self.policy.decide(attempts, retry_after) {
                        RetryDecision::Wait(wait) => {
                            warn!(
                                %recipient,
                                attempts,
                                wait_ms = wait.as_millis() as u64,
                                "Rate limited, backing off"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        RetryDecision::GiveUp => {
                            warn!(%recipient, attempts, "Rate limit retries exhausted");
                            return Err(DeliveryError::RetriesExhausted {
                                recipient,
                                attempts,
                                source: TransportError::RateLimited { retry_after },
                            });
                        }
                    }
                }
                Err(source) => {
                    return Err(DeliveryError::Transport { recipient, source });
                }
            }
        }
    }

    /// Plain-text convenience wrapper around [`send`](Self::send).
    pub async fn send_text(
        &self,
        recipient: Recipient,
        content: impl Into<String>,
    ) -> DeliveryResult<MessageReceipt> {
        self.send(recipient, &OutgoingMessage::text(content)).await
    }
}
