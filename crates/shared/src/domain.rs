use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// String identifiers are compared case-insensitively across every source
/// (REST pages, push frames, local state), so they are canonicalized once here.
fn canonicalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl AsRef<str>) -> Self {
                Self(canonicalize(raw.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::new(raw))
            }
        }
    };
}

id_newtype!(ConversationId);
id_newtype!(MessageId);
id_newtype!(AccountId);
id_newtype!(CorrelationId);

impl CorrelationId {
    /// Fresh high-entropy id for an outbound message.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ConversationId {
    /// Push-channel group that fans out events for this conversation.
    pub fn push_group(&self) -> String {
        format!("conversation:{}", self.0)
    }
}

/// Opaque reference to a locally allocated preview resource (an object URL on
/// web platforms, a decoded buffer on desktop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalHandle(pub u64);

impl fmt::Display for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[serde(alias = "Image", alias = "IMAGE")]
    Image,
    #[serde(alias = "Video", alias = "VIDEO")]
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Sent")]
    Sent,
    #[serde(alias = "Failed")]
    Failed,
    #[serde(alias = "Confirmed")]
    Confirmed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Display metadata attached to receipts and typing notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(default, alias = "displayName", alias = "DisplayName")]
    pub display_name: Option<String>,
    #[serde(default, alias = "avatarUrl", alias = "AvatarUrl")]
    pub avatar_url: Option<String>,
}
