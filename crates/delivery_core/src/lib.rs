//! Client-side delivery pipeline for one open conversation: optimistic sends,
//! push-event reconciliation, deferred read receipts and preview-resource
//! ownership.

use std::sync::atomic::{AtomicU64, Ordering};

use shared::domain::{
    AccountId, ConversationId, CorrelationId, MemberInfo, MessageId, MessageStatus,
};

pub mod config;
mod controller;
pub mod error;
pub mod generation;
mod lifecycle;
pub mod push;
pub mod receipts;
mod reconciler;
pub mod resources;
mod session;
pub mod timeline;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use controller::{
    ControllerDependencies, ConversationController, ConversationSnapshot, LoadOutcome,
    SeenMarkerView, SendHandle,
};
pub use error::{ConversationError, TransportError};
pub use lifecycle::{OutgoingFile, RetryPayload, SubmissionOutcome};
pub use reconciler::{MergeOutcome, PushOutcome, SeenOutcome};
pub use timeline::{MediaItem, Message};

/// Opaque handle the presenter returns for a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewRef(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Above everything rendered so far (history pages).
    Top,
    /// Below everything rendered so far (new and live messages).
    Bottom,
}

/// Rendering collaborator. The core only ever addresses rendered messages
/// through the [`ViewRef`] it was handed back.
pub trait MessagePresenter: Send + Sync {
    fn render(&self, message: &Message, placement: Placement) -> ViewRef;
    fn refresh(&self, view: ViewRef, message: &Message);
    /// Takes a rendered message out of the view. The handle is not reused.
    fn remove(&self, view: ViewRef);
    fn set_sent_indicator(&self, view: ViewRef, visible: bool);
    fn move_seen_marker(&self, account_id: &AccountId, member_info: &MemberInfo, view: ViewRef);
    fn show_typing(&self, account_id: &AccountId, member_info: &MemberInfo);
    fn hide_typing(&self, account_id: &AccountId);
    fn reset(&self);
}

/// Presenter for callers that only consume [`ConversationController::snapshot`].
#[derive(Default)]
pub struct HeadlessPresenter {
    next_view: AtomicU64,
}

impl MessagePresenter for HeadlessPresenter {
    fn render(&self, _message: &Message, _placement: Placement) -> ViewRef {
        ViewRef(self.next_view.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn refresh(&self, _view: ViewRef, _message: &Message) {}

    fn remove(&self, _view: ViewRef) {}

    fn set_sent_indicator(&self, _view: ViewRef, _visible: bool) {}

    fn move_seen_marker(&self, _account_id: &AccountId, _member_info: &MemberInfo, _view: ViewRef) {
    }

    fn show_typing(&self, _account_id: &AccountId, _member_info: &MemberInfo) {}

    fn hide_typing(&self, _account_id: &AccountId) {}

    fn reset(&self) {}
}

/// Fire-and-forget notifications for the conversation list. Implementations
/// must not block.
pub trait SidebarNotifier: Send + Sync {
    fn conversation_preview_updated(&self, conversation_id: &ConversationId, preview: &str);
    fn unread_count_changed(&self, conversation_id: &ConversationId);
}

pub struct NoopSidebar;

impl SidebarNotifier for NoopSidebar {
    fn conversation_preview_updated(&self, _conversation_id: &ConversationId, _preview: &str) {}

    fn unread_count_changed(&self, _conversation_id: &ConversationId) {}
}

pub trait IdentityProvider: Send + Sync {
    fn local_account_id(&self) -> AccountId;
}

pub struct StaticIdentity(pub AccountId);

impl IdentityProvider for StaticIdentity {
    fn local_account_id(&self) -> AccountId {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    ConversationOpened {
        conversation_id: ConversationId,
        generation: u64,
    },
    ConversationClosed {
        conversation_id: ConversationId,
    },
    MessageStatusChanged {
        conversation_id: ConversationId,
        correlation_id: Option<CorrelationId>,
        message_id: Option<MessageId>,
        status: MessageStatus,
    },
    MessageFailed {
        conversation_id: ConversationId,
        correlation_id: CorrelationId,
        reason: String,
    },
    Error(String),
}
