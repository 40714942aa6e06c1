//! Discord REST transport.
//!
//! Only the two calls the bot needs: create a message in a channel, and open
//! a DM channel with a user. DM channel ids are cached per user.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use round_coordination::{
    Affordance, MessageReceipt, OutgoingMessage, Recipient, Transport, TransportError, UserId,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DiscordConfig;

/// `custom_id` of the answer button; interaction events carry it back.
pub const ANSWER_BUTTON_ID: &str = "daily-question:answer";

const ANSWER_BUTTON_LABEL: &str = "Answer";

/// Message body for `POST /channels/{id}/messages`.
pub fn message_payload(message: &OutgoingMessage) -> Value {
    match message.affordance {
        None => json!({ "content": message.content }),
        Some(Affordance::AnswerButton) => json!({
            "content": message.content,
            "components": [{
                "type": 1,
                "components": [{
                    "type": 2,
                    "style": 1,
                    "label": ANSWER_BUTTON_LABEL,
                    "custom_id": ANSWER_BUTTON_ID,
                }],
            }],
        }),
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

/// Retry hint of a 429: JSON `retry_after` first, then the `Retry-After` header.
pub fn parse_retry_after(body: &str, header: Option<&str>) -> Option<Duration> {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| b.retry_after)
        .and_then(seconds)
        .or_else(|| {
            header
                .and_then(|h| h.trim().parse::<f64>().ok())
                .and_then(seconds)
        })
}

/// Map a non-success response to a transport error.
pub fn classify_failure(
    status: u16,
    body: &str,
    retry_after_header: Option<&str>,
) -> TransportError {
    if status == 429 {
        TransportError::RateLimited {
            retry_after: parse_retry_after(body, retry_after_header),
        }
    } else {
        TransportError::Rejected {
            status,
            body: body.to_string(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub struct DiscordTransport {
    http: reqwest::Client,
    api_base: String,
    auth: String,
    dm_channels: Mutex<HashMap<UserId, String>>,
}

impl DiscordTransport {
    pub fn new(config: &DiscordConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            auth: format!("Bot {}", config.token),
            dm_channels: Mutex::new(HashMap::new()),
        })
    }

    /// POST `body` to `path`, returning the created object's id.
    async fn post(&self, path: &str, body: &Value) -> Result<String, TransportError> {
        let response = self
            .http
            .post(format!("{}{path}", self.api_base))
            .header(AUTHORIZATION, &self.auth)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let retry_after = header_str(response.headers(), RETRY_AFTER).map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(
                status.as_u16(),
                &text,
                retry_after.as_deref(),
            ));
        }

        serde_json::from_str::<Created>(&text)
            .map(|c| c.id)
            .map_err(|e| TransportError::Rejected {
                status: status.as_u16(),
                body: format!("unexpected response: {e}"),
            })
    }

    async fn dm_channel(&self, user: UserId) -> Result<String, TransportError> {
        if let Some(id) = self.dm_channels.lock().await.get(&user) {
            return Ok(id.clone());
        }
        let id = self
            .post(
                "/users/@me/channels",
                &json!({ "recipient_id": user.to_string() }),
            )
            .await?;
        debug!(%user, channel = %id, "Opened DM channel");
        self.dm_channels.lock().await.insert(user, id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send(
        &self,
        recipient: Recipient,
        message: &OutgoingMessage,
    ) -> Result<MessageReceipt, TransportError> {
        let channel = match recipient {
            Recipient::Channel(id) => id.to_string(),
            Recipient::Direct(user) => self.dm_channel(user).await?,
        };
        let id = self
            .post(
                &format!("/channels/{channel}/messages"),
                &message_payload(message),
            )
            .await?;
        Ok(MessageReceipt {
            message_id: Some(id),
        })
    }
}
