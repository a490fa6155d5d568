use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use chrono::Utc;
use shared::{
    domain::{AccountId, ConversationId, CorrelationId, MediaKind, MemberInfo, MessageStatus},
    protocol::{RemoteMedia, ServerMessage},
};

use crate::{
    generation::GenerationGuard, resources::InMemoryPreviewStore, session::ConversationSession,
    Message, MessagePresenter, Placement, SidebarNotifier, ViewRef,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PresenterCall {
    Render {
        view: ViewRef,
        content: String,
        status: MessageStatus,
        placement: Placement,
    },
    Refresh {
        view: ViewRef,
        status: MessageStatus,
        local_handles: usize,
    },
    Remove(ViewRef),
    SentIndicator {
        view: ViewRef,
        visible: bool,
    },
    SeenMarker {
        account_id: AccountId,
        view: ViewRef,
    },
    ShowTyping(AccountId),
    HideTyping(AccountId),
    Reset,
}

#[derive(Default)]
pub(crate) struct RecordingPresenter {
    next_view: AtomicU64,
    calls: Mutex<Vec<PresenterCall>>,
}

impl RecordingPresenter {
    pub(crate) fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().expect("presenter lock").clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().expect("presenter lock").clear();
    }

    fn record(&self, call: PresenterCall) {
        self.calls.lock().expect("presenter lock").push(call);
    }
}

impl MessagePresenter for RecordingPresenter {
    fn render(&self, message: &Message, placement: Placement) -> ViewRef {
        let view = ViewRef(self.next_view.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(PresenterCall::Render {
            view,
            content: message.content.clone(),
            status: message.status,
            placement,
        });
        view
    }

    fn refresh(&self, view: ViewRef, message: &Message) {
        self.record(PresenterCall::Refresh {
            view,
            status: message.status,
            local_handles: message.local_handles().count(),
        });
    }

    fn remove(&self, view: ViewRef) {
        self.record(PresenterCall::Remove(view));
    }

    fn set_sent_indicator(&self, view: ViewRef, visible: bool) {
        self.record(PresenterCall::SentIndicator { view, visible });
    }

    fn move_seen_marker(&self, account_id: &AccountId, _member_info: &MemberInfo, view: ViewRef) {
        self.record(PresenterCall::SeenMarker {
            account_id: account_id.clone(),
            view,
        });
    }

    fn show_typing(&self, account_id: &AccountId, _member_info: &MemberInfo) {
        self.record(PresenterCall::ShowTyping(account_id.clone()));
    }

    fn hide_typing(&self, account_id: &AccountId) {
        self.record(PresenterCall::HideTyping(account_id.clone()));
    }

    fn reset(&self) {
        self.record(PresenterCall::Reset);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SidebarCall {
    Preview(ConversationId, String),
    Unread(ConversationId),
}

#[derive(Default)]
pub(crate) struct RecordingSidebar {
    calls: Mutex<Vec<SidebarCall>>,
}

impl RecordingSidebar {
    pub(crate) fn calls(&self) -> Vec<SidebarCall> {
        self.calls.lock().expect("sidebar lock").clone()
    }
}

impl SidebarNotifier for RecordingSidebar {
    fn conversation_preview_updated(&self, conversation_id: &ConversationId, preview: &str) {
        self.calls
            .lock()
            .expect("sidebar lock")
            .push(SidebarCall::Preview(conversation_id.clone(), preview.to_string()));
    }

    fn unread_count_changed(&self, conversation_id: &ConversationId) {
        self.calls
            .lock()
            .expect("sidebar lock")
            .push(SidebarCall::Unread(conversation_id.clone()));
    }
}

pub(crate) struct SessionFixture {
    pub(crate) session: ConversationSession,
    pub(crate) presenter: Arc<RecordingPresenter>,
    pub(crate) sidebar: Arc<RecordingSidebar>,
    pub(crate) previews: Arc<InMemoryPreviewStore>,
}

/// Session for conversation `c1` opened by account `me`.
pub(crate) fn session_fixture() -> SessionFixture {
    let guard = GenerationGuard::new();
    let presenter = Arc::new(RecordingPresenter::default());
    let sidebar = Arc::new(RecordingSidebar::default());
    let previews = Arc::new(InMemoryPreviewStore::new());
    let session = ConversationSession::new(
        guard.begin_generation(&ConversationId::new("c1")),
        AccountId::new("me"),
        previews.clone(),
        presenter.clone(),
        sidebar.clone(),
    );
    SessionFixture {
        session,
        presenter,
        sidebar,
        previews,
    }
}

pub(crate) fn server_message(id: &str, sender: &str, content: &str) -> ServerMessage {
    ServerMessage {
        message_id: id.into(),
        conversation_id: ConversationId::new("c1"),
        sender_id: AccountId::new(sender),
        content: content.to_string(),
        media: Vec::new(),
        sent_at: Utc::now(),
        temp_correlation_id: None,
    }
}

pub(crate) fn echo_of(
    id: &str,
    correlation_id: Option<&CorrelationId>,
    content: &str,
    media: &[(&str, MediaKind)],
) -> ServerMessage {
    ServerMessage {
        media: media
            .iter()
            .map(|(url, kind)| RemoteMedia {
                url: url.to_string(),
                kind: *kind,
            })
            .collect(),
        temp_correlation_id: correlation_id.cloned(),
        ..server_message(id, "me", content)
    }
}

pub(crate) fn member(name: &str) -> MemberInfo {
    MemberInfo {
        display_name: Some(name.to_string()),
        avatar_url: None,
    }
}
