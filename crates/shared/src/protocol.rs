use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    AccountId, ConversationId, CorrelationId, MediaKind, MemberInfo, MessageId, MessageStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    #[serde(alias = "remoteUrl", alias = "Url")]
    pub url: String,
    #[serde(alias = "Kind", alias = "type")]
    pub kind: MediaKind,
}

/// A message as persisted by the message service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: AccountId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Vec<RemoteMedia>,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_correlation_id: Option<CorrelationId>,
}

/// One page of history. `items` are ordered oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFile {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub kind: MediaKind,
    pub data_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMessageRequest {
    pub temp_correlation_id: CorrelationId,
    pub content: String,
    #[serde(default)]
    pub files: Vec<UploadFile>,
}

/// Frames the client writes to the push socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushCommand {
    Join { group: String },
    Leave { group: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushPayloadError {
    #[error("push payload is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Push frames as they arrive. Different producers disagree on field casing,
/// so every field accepts the known spellings. Convert with
/// [`RawPushEvent::normalize`] before handing the event to anything else.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RawPushEvent {
    #[serde(alias = "messageCreated", alias = "MessageCreated", alias = "message")]
    MessageCreated(RawMessageCreated),
    #[serde(alias = "messageSeen", alias = "MessageSeen", alias = "seen")]
    MessageSeen(RawMessageSeen),
    #[serde(alias = "Typing", alias = "userTyping")]
    Typing(RawTyping),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessageCreated {
    #[serde(default, alias = "conversationId", alias = "ConversationId")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "messageId", alias = "MessageId", alias = "id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "senderId", alias = "SenderId")]
    pub sender_id: Option<String>,
    #[serde(default, alias = "Content", alias = "text")]
    pub content: Option<String>,
    #[serde(default, alias = "Media", alias = "mediaItems")]
    pub media: Vec<RemoteMedia>,
    #[serde(default, alias = "sentAt", alias = "SentAt", alias = "createdAt")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "tempCorrelationId",
        alias = "TempCorrelationId",
        alias = "tempId"
    )]
    pub temp_correlation_id: Option<String>,
    #[serde(default, alias = "Status")]
    pub status: Option<MessageStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessageSeen {
    #[serde(default, alias = "conversationId", alias = "ConversationId")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "messageId", alias = "MessageId")]
    pub message_id: Option<String>,
    #[serde(default, alias = "accountId", alias = "AccountId")]
    pub account_id: Option<String>,
    #[serde(default, alias = "memberInfo", alias = "MemberInfo", alias = "member")]
    pub member_info: Option<MemberInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTyping {
    #[serde(default, alias = "conversationId", alias = "ConversationId")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "accountId", alias = "AccountId")]
    pub account_id: Option<String>,
    #[serde(default, alias = "memberInfo", alias = "MemberInfo", alias = "member")]
    pub member_info: Option<MemberInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCreated {
    pub message: ServerMessage,
    pub status: Option<MessageStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSeen {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub account_id: AccountId,
    pub member_info: MemberInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingNotice {
    pub conversation_id: ConversationId,
    pub account_id: AccountId,
    pub member_info: MemberInfo,
}

/// Canonical push event. Ids are already case-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    MessageCreated(MessageCreated),
    MessageSeen(MessageSeen),
    Typing(TypingNotice),
}

impl PushEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::MessageCreated(event) => &event.message.conversation_id,
            Self::MessageSeen(event) => &event.conversation_id,
            Self::Typing(event) => &event.conversation_id,
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, PushPayloadError> {
    value
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(PushPayloadError::MissingField(field))
}

impl RawPushEvent {
    pub fn normalize(self) -> Result<PushEvent, PushPayloadError> {
        match self {
            Self::MessageCreated(raw) => {
                let message = ServerMessage {
                    message_id: MessageId::new(required(raw.message_id, "message_id")?),
                    conversation_id: ConversationId::new(required(
                        raw.conversation_id,
                        "conversation_id",
                    )?),
                    sender_id: AccountId::new(required(raw.sender_id, "sender_id")?),
                    content: raw.content.unwrap_or_default(),
                    media: raw.media,
                    sent_at: raw.sent_at.unwrap_or_else(Utc::now),
                    temp_correlation_id: raw
                        .temp_correlation_id
                        .filter(|value| !value.trim().is_empty())
                        .map(CorrelationId::new),
                };
                Ok(PushEvent::MessageCreated(MessageCreated {
                    message,
                    status: raw.status,
                }))
            }
            Self::MessageSeen(raw) => Ok(PushEvent::MessageSeen(MessageSeen {
                conversation_id: ConversationId::new(required(
                    raw.conversation_id,
                    "conversation_id",
                )?),
                message_id: MessageId::new(required(raw.message_id, "message_id")?),
                account_id: AccountId::new(required(raw.account_id, "account_id")?),
                member_info: raw.member_info.unwrap_or_default(),
            })),
            Self::Typing(raw) => Ok(PushEvent::Typing(TypingNotice {
                conversation_id: ConversationId::new(required(
                    raw.conversation_id,
                    "conversation_id",
                )?),
                account_id: AccountId::new(required(raw.account_id, "account_id")?),
                member_info: raw.member_info.unwrap_or_default(),
            })),
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
