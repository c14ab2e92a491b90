//! Delivery error types

use thiserror::Error;

/// Failure to hand a reply to the messaging provider
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
    /// Provider-specific error code, when the provider returned one
    pub provider_code: Option<i64>,
}

impl DeliveryError {
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider_code: None,
        }
    }

    pub fn with_provider_code(mut self, code: Option<i64>) -> Self {
        self.provider_code = code;
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::MalformedResponse, message)
    }

    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::new(
                DeliveryErrorKind::Auth,
                format!("Authentication failed: {message}"),
            ),
            500..=599 => Self::new(
                DeliveryErrorKind::ServerError,
                format!("Server error: {message}"),
            ),
            _ => Self::new(
                DeliveryErrorKind::Rejected,
                format!("HTTP {status}: {message}"),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    Timeout,
    Network,
    /// Bad account credentials (401, 403)
    Auth,
    /// Provider refused the message (invalid number, unapproved sender, ...)
    Rejected,
    ServerError,
    MalformedResponse,
}

impl DeliveryErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Rejected => "rejected",
            Self::ServerError => "server_error",
            Self::MalformedResponse => "malformed_response",
        }
    }
}
