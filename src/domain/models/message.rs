#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;

pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Addresses a bare phone number as a user JID. Anything already carrying a
/// server part (`@g.us`, `@s.whatsapp.net`, ...) is passed through untouched.
pub fn to_jid(recipient: &str) -> String {
    if recipient.contains('@') {
        return recipient.to_string();
    }

    return format!("{recipient}{USER_JID_SUFFIX}");
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text message.
    Conversation(String),
    /// Text with link previews, quotes or mentions attached.
    ExtendedText(String),
    /// Media, reactions, polls and anything else without a text body.
    Other,
}

impl MessageContent {
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Conversation(text) => return text,
            MessageContent::ExtendedText(text) => return text,
            MessageContent::Other => return "",
        }
    }
}

/// A message as delivered by the connector, before any filtering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub remote_jid: String,
    pub id: String,
    pub from_me: bool,
    pub timestamp: Option<i64>,
    pub content: Option<MessageContent>,
}

/// The record forwarded to the backend. Field names are part of the backend
/// contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub phone_number: String,
    pub message: String,
    pub message_id: String,
    pub timestamp: i64,
}

impl InboundMessage {
    /// Returns `None` for messages that must not be relayed: the ones sent by
    /// this session and the ones without any content.
    pub fn from_received(received: &ReceivedMessage) -> Option<InboundMessage> {
        if received.from_me {
            return None;
        }

        let content = received.content.as_ref()?;
        let timestamp = received
            .timestamp
            .unwrap_or_else(|| return chrono::Utc::now().timestamp());

        return Some(InboundMessage {
            phone_number: received.remote_jid.replace(USER_JID_SUFFIX, ""),
            message: content.text().to_string(),
            message_id: received.id.to_string(),
            timestamp,
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn ok() -> SendResult {
        return SendResult {
            success: true,
            error: None,
        };
    }

    pub fn failed(error: &str) -> SendResult {
        return SendResult {
            success: false,
            error: Some(error.to_string()),
        };
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SendRequest {
    pub phone_number: String,
    pub message: String,
}

impl SendRequest {
    pub const MISSING_FIELDS: &'static str = "phone_number and message are required";

    /// Parses a `POST /send` body. Numbers are accepted for `phone_number`
    /// since callers often store phone numbers numerically. Empty strings
    /// count as missing.
    pub fn parse(body: &[u8]) -> Option<SendRequest> {
        let payload = serde_json::from_slice::<serde_json::Value>(body).ok()?;

        let phone_number = non_empty_field(&payload, "phone_number")?;
        let message = non_empty_field(&payload, "message")?;

        return Some(SendRequest {
            phone_number,
            message,
        });
    }
}

fn non_empty_field(payload: &serde_json::Value, key: &str) -> Option<String> {
    let value = match payload.get(key)? {
        serde_json::Value::String(text) => text.to_string(),
        serde_json::Value::Number(number) => number.to_string(),
        _ => return None,
    };

    if value.is_empty() {
        return None;
    }

    return Some(value);
}
