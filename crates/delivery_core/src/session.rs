use std::{collections::HashMap, sync::Arc};

use shared::domain::{AccountId, ConversationId, LocalHandle, MessageId};
use tracing::{debug, info};

use crate::{
    generation::GenerationToken,
    lifecycle::Outbox,
    receipts::PendingReceiptQueue,
    reconciler::apply_receipt,
    resources::{PreviewStore, ResourceTracker},
    timeline::{Position, Timeline},
    MessagePresenter, Placement, SidebarNotifier,
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Paging {
    pub(crate) next_page: u32,
    pub(crate) has_more: bool,
    pub(crate) in_flight: bool,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            next_page: 0,
            has_more: true,
            in_flight: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TeardownSummary {
    pub(crate) released_handles: usize,
    pub(crate) dropped_receipts: usize,
}

/// Everything bound to the open conversation. Built on open and torn down on
/// switch or close; nothing in here outlives the session.
pub(crate) struct ConversationSession {
    pub(crate) conversation_id: ConversationId,
    pub(crate) generation: GenerationToken,
    pub(crate) local_account: AccountId,
    pub(crate) timeline: Timeline,
    pub(crate) receipts: PendingReceiptQueue,
    pub(crate) resources: ResourceTracker,
    pub(crate) outbox: Outbox,
    pub(crate) paging: Paging,
    pub(crate) typing: HashMap<AccountId, u64>,
    pub(crate) presenter: Arc<dyn MessagePresenter>,
    pub(crate) sidebar: Arc<dyn SidebarNotifier>,
}

impl ConversationSession {
    pub(crate) fn new(
        generation: GenerationToken,
        local_account: AccountId,
        previews: Arc<dyn PreviewStore>,
        presenter: Arc<dyn MessagePresenter>,
        sidebar: Arc<dyn SidebarNotifier>,
    ) -> Self {
        Self {
            conversation_id: generation.context().clone(),
            generation,
            local_account,
            timeline: Timeline::new(),
            receipts: PendingReceiptQueue::new(),
            resources: ResourceTracker::new(previews),
            outbox: Outbox::default(),
            paging: Paging::default(),
            typing: HashMap::new(),
            presenter,
            sidebar,
        }
    }

    pub(crate) fn is_generation(&self, token: &GenerationToken) -> bool {
        &self.generation == token
    }

    pub(crate) fn render(&mut self, position: Position, placement: Placement) {
        let Some(entry) = self.timeline.entry(position) else {
            return;
        };
        let view = self.presenter.render(&entry.message, placement);
        self.timeline.set_view(position, view);
    }

    pub(crate) fn refresh(&self, position: Position) {
        if let Some(entry) = self.timeline.entry(position) {
            if let Some(view) = entry.view {
                self.presenter.refresh(view, &entry.message);
            }
        }
    }

    /// At most one message shows the transient "sent" indicator, and it
    /// never moves back to an older message.
    pub(crate) fn move_sent_indicator(&mut self, position: Position) {
        if self
            .timeline
            .sent_indicator()
            .is_some_and(|current| current > position)
        {
            return;
        }
        if let Some(previous) = self.timeline.move_sent_indicator(position) {
            if let Some(view) = self.timeline.view_of(previous) {
                self.presenter.set_sent_indicator(view, false);
            }
        }
        if let Some(view) = self.timeline.view_of(position) {
            self.presenter.set_sent_indicator(view, true);
        }
    }

    /// Revokes handles whose media already point at the remote copy. The
    /// view must have been refreshed with the remote reference first.
    pub(crate) fn release_detached(&mut self, handles: Vec<LocalHandle>) {
        for handle in handles {
            self.resources.release(handle);
        }
    }

    pub(crate) fn flush_receipts_for(&mut self, message_id: &MessageId) -> usize {
        let Self {
            conversation_id,
            local_account,
            timeline,
            receipts,
            presenter,
            ..
        } = self;
        let flushed = receipts.flush(conversation_id, message_id, |receipt| {
            apply_receipt(
                timeline,
                presenter.as_ref(),
                local_account,
                &receipt.account_id,
                receipt.member_info,
                &receipt.message_id,
            );
        });
        if flushed > 0 {
            debug!(
                conversation_id = %self.conversation_id,
                message_id = %message_id,
                flushed,
                "session: applied queued receipts"
            );
        }
        flushed
    }

    pub(crate) fn teardown(&mut self) -> TeardownSummary {
        let summary = TeardownSummary {
            released_handles: self.resources.release_all(),
            dropped_receipts: self.receipts.clear_conversation(&self.conversation_id),
        };
        self.typing.clear();
        self.presenter.reset();
        info!(
            conversation_id = %self.conversation_id,
            generation = self.generation.value(),
            released_handles = summary.released_handles,
            dropped_receipts = summary.dropped_receipts,
            "session: torn down"
        );
        summary
    }
}
