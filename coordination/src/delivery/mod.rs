//! Resilient message delivery over a pluggable chat transport.

pub mod gateway;
pub mod retry;
pub mod transport;

pub use gateway::{DeliveryError, DeliveryGateway, DeliveryResult};
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
pub use transport::{
    Affordance, MessageReceipt, OutgoingMessage, Recipient, Transport, TransportError,
};
