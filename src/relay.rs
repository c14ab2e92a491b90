//! Webhook orchestration
//!
//! One inbound chat message in, one generated reply out:
//! validate, persist inbound, build context, generate, deliver, persist
//! outgoing. Each step's failure maps to exactly one [`RelayError`] variant.
//!
//! Delivery failures follow a persist-and-report policy: once a reply has
//! been generated it is logged as outgoing even if the provider refuses it,
//! and the caller still receives [`RelayError::Delivery`].

#[cfg(test)]
pub mod testing;
mod traits;

pub use traits::MessageStore;

use crate::config::{strip_channel_prefix, AppConfig};
use crate::db::{DbError, Direction, Message, NewMessage};
use crate::llm::{CompletionProvider, CompletionRequest, LlmError, Turn};
use crate::messaging::{DeliveryError, MessagingProvider};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Reply generation failed: {0}")]
    Generation(#[source] LlmError),
    #[error("Reply delivery failed: {0}")]
    Delivery(#[source] DeliveryError),
    #[error("Storage failure: {0}")]
    Storage(#[from] DbError),
}

impl RelayError {
    /// Stable label used in error bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::Generation(_) => "generation",
            RelayError::Delivery(_) => "delivery",
            RelayError::Storage(_) => "storage",
        }
    }
}

/// A validated inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The chat user's number; replies go here
    pub user: String,
    pub text: String,
    /// Service number the user wrote to, when the provider reports it
    pub addressed_to: Option<String>,
}

impl InboundMessage {
    /// Validate raw webhook fields. `whatsapp:` prefixes are stripped.
    pub fn new(
        user: Option<String>,
        text: Option<String>,
        addressed_to: Option<String>,
    ) -> Result<Self, RelayError> {
        let user = user
            .as_deref()
            .map(strip_channel_prefix)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RelayError::Validation("recipient is required".to_string()))?
            .to_string();

        let text = text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RelayError::Validation("message is required".to_string()))?;

        let addressed_to = addressed_to
            .as_deref()
            .map(strip_channel_prefix)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(Self {
            user,
            text,
            addressed_to,
        })
    }
}

/// Reply returned to the webhook caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub recipient: String,
    pub sender: String,
    pub message: String,
}

/// Relay settings derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub service_number: String,
    pub instructions: String,
    pub history_depth: usize,
    pub upstream_timeout: Duration,
}

impl From<&AppConfig> for RelaySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            service_number: config.messaging.whatsapp_number.clone(),
            instructions: config.completion.instructions.clone(),
            history_depth: config.history_depth,
            upstream_timeout: config.upstream_timeout,
        }
    }
}

pub struct Relay {
    settings: RelaySettings,
    store: Arc<dyn MessageStore>,
    completion: Arc<dyn CompletionProvider>,
    messaging: Arc<dyn MessagingProvider>,
}

impl Relay {
    pub fn new(
        settings: RelaySettings,
        store: Arc<dyn MessageStore>,
        completion: Arc<dyn CompletionProvider>,
        messaging: Arc<dyn MessagingProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            completion,
            messaging,
        }
    }

    /// Answer one inbound message
    pub async fn handle(&self, inbound: InboundMessage) -> Result<ChatReply, RelayError> {
        let span = tracing::info_span!("relay", user = %inbound.user);
        self.handle_inner(inbound).instrument(span).await
    }

    async fn handle_inner(&self, inbound: InboundMessage) -> Result<ChatReply, RelayError> {
        let service = self.settings.service_number.as_str();
        if let Some(to) = inbound.addressed_to.as_deref() {
            if to != service {
                tracing::warn!(addressed_to = %to, service = %service, "Inbound message addressed to a different number");
            }
        }

        let stored = self
            .store
            .append(&NewMessage::incoming(&inbound.user, service, &inbound.text))
            .await?;
        tracing::info!(message_id = stored.id, chars = inbound.text.chars().count(), "Inbound message stored");

        let request = self.build_request(&inbound, stored.id).await?;

        let reply = match tokio::time::timeout(
            self.settings.upstream_timeout,
            self.completion.generate(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::timeout(format!(
                "No reply within {}s",
                self.settings.upstream_timeout.as_secs_f32()
            ))),
        }
        .map_err(RelayError::Generation)?;

        let delivery = match tokio::time::timeout(
            self.settings.upstream_timeout,
            self.messaging.send(&inbound.user, service, &reply),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::timeout(format!(
                "Provider did not answer within {}s",
                self.settings.upstream_timeout.as_secs_f32()
            ))),
        };

        match &delivery {
            Ok(receipt) => {
                tracing::info!(provider_id = %receipt.provider_id, status = %receipt.status, "Reply delivered");
            }
            Err(e) => {
                tracing::error!(
                    kind = e.kind.as_str(),
                    provider_code = ?e.provider_code,
                    error = %e,
                    "Reply delivery failed; storing reply anyway"
                );
            }
        }

        let outgoing = self
            .store
            .append(&NewMessage::outgoing(&inbound.user, service, &reply))
            .await?;
        tracing::info!(message_id = outgoing.id, "Outgoing message stored");

        delivery.map_err(RelayError::Delivery)?;

        Ok(ChatReply {
            recipient: inbound.user,
            sender: service.to_string(),
            message: reply,
        })
    }

    /// Windowed history: the last `history_depth` messages of the
    /// conversation, oldest first, then the inbound message.
    async fn build_request(
        &self,
        inbound: &InboundMessage,
        inbound_id: i64,
    ) -> Result<CompletionRequest, RelayError> {
        let depth = self.settings.history_depth;
        let mut turns = Vec::with_capacity(depth + 1);

        if depth > 0 {
            let history = self
                .store
                .list_by_recipient(&inbound.user, depth + 1)
                .await?;
            turns.extend(
                history
                    .into_iter()
                    .filter(|m| m.id != inbound_id)
                    .take(depth)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .map(|m| match m.direction {
                        Direction::Incoming => Turn::user(m.message_text),
                        Direction::Outgoing => Turn::assistant(m.message_text),
                    }),
            );
        }
        turns.push(Turn::user(inbound.text.as_str()));

        let instructions = Some(self.settings.instructions.clone()).filter(|i| !i.is_empty());
        Ok(CompletionRequest {
            instructions,
            turns,
        })
    }

    /// Full two-way conversation for `party`, newest first
    pub async fn history(&self, party: &str, limit: usize) -> Result<Vec<Message>, RelayError> {
        let party = strip_channel_prefix(party);
        Ok(self.store.list_by_recipient(party, limit).await?)
    }
}
