use shared::domain::{ConversationId, CorrelationId};
use thiserror::Error;

/// Failure reported by a [`crate::transport::MessageTransport`]. Client errors and
/// connection failures are kept apart so the caller can surface the server's
/// message when one was provided.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error(
        "server rejected request with status {status}: {}",
        .message.as_deref().unwrap_or("no details")
    )]
    Rejected { status: u16, message: Option<String> },
    #[error("transport failure: {0}")]
    Connection(String),
}

impl TransportError {
    /// Text suitable for an inline "failed to send" notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Rejected { status, .. } => format!("Message was rejected (status {status})."),
            Self::Connection(_) => "Could not reach the server; tap to retry.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("validation failed: {0}")]
    Validation(&'static str),
    #[error("cannot retry message {correlation_id}: {reason}")]
    InvalidRetryState {
        correlation_id: CorrelationId,
        reason: &'static str,
    },
    #[error("conversation {0} is not the active conversation")]
    NotActive(ConversationId),
    #[error("no conversation is open")]
    NoActiveConversation,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConversationError {
    pub fn invalid_retry(correlation_id: &CorrelationId, reason: &'static str) -> Self {
        Self::InvalidRetryState {
            correlation_id: correlation_id.clone(),
            reason,
        }
    }
}
