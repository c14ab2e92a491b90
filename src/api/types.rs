//! API request and response types

use crate::relay::ChatReply;
use serde::{Deserialize, Serialize};

/// JSON body for `POST /chat`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    /// The chat user's number
    pub recipient: Option<String>,
    pub message: Option<String>,
    /// Service number the user wrote to
    pub sender: Option<String>,
}

/// Provider webhook form for `POST /chat`
///
/// Twilio posts `From` (the user), `To` (our number) and `Body` along with
/// many other fields, which are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookForm {
    #[serde(rename = "From", alias = "recipient")]
    pub from: Option<String>,
    #[serde(rename = "To", alias = "sender")]
    pub to: Option<String>,
    #[serde(rename = "Body", alias = "body", alias = "message")]
    pub body: Option<String>,
}

/// Response for a relayed chat message
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub recipient: String,
    pub sender: String,
    pub message: String,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            recipient: reply.recipient,
            sender: reply.sender,
            message: reply.message,
        }
    }
}

/// Liveness payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl ErrorResponse {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind,
        }
    }
}
