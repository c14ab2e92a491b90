//! Messaging provider abstraction

pub mod error;
mod twilio;

pub use error::DeliveryError;
pub use twilio::TwilioWhatsApp;

use async_trait::async_trait;
use std::sync::Arc;

/// Provider acknowledgement for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message identifier (Twilio `SM...` SID)
    pub provider_id: String,
    /// Provider status at acceptance time, e.g. `queued`
    pub status: String,
}

/// Sends a text to a chat user
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        sender: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

#[async_trait]
impl<T: MessagingProvider + ?Sized> MessagingProvider for Arc<T> {
    async fn send(
        &self,
        recipient: &str,
        sender: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        (**self).send(recipient, sender, text).await
    }
}
