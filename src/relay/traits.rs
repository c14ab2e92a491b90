//! Storage seam for the relay
//!
//! The two provider seams live with their clients
//! ([`crate::llm::CompletionProvider`], [`crate::messaging::MessagingProvider`]);
//! this one lets tests wrap the store with failure injection.

use crate::db::{Database, DbError, Message, NewMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Append-only message log
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message; id and timestamp are assigned by the store
    async fn append(&self, message: &NewMessage) -> Result<Message, DbError>;

    /// Messages where `party` is sender or recipient, newest first
    async fn list_by_recipient(&self, party: &str, limit: usize) -> Result<Vec<Message>, DbError>;
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn append(&self, message: &NewMessage) -> Result<Message, DbError> {
        (**self).append(message).await
    }

    async fn list_by_recipient(&self, party: &str, limit: usize) -> Result<Vec<Message>, DbError> {
        (**self).list_by_recipient(party, limit).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

#[async_trait]
impl MessageStore for Database {
    async fn append(&self, message: &NewMessage) -> Result<Message, DbError> {
        Database::append(self, message)
    }

    async fn list_by_recipient(&self, party: &str, limit: usize) -> Result<Vec<Message>, DbError> {
        Database::list_by_recipient(self, party, limit)
    }
}
