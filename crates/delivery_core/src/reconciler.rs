use shared::{
    domain::{AccountId, MemberInfo, MessageId, MessageStatus},
    protocol::{MessageCreated, MessageSeen, ServerMessage, TypingNotice},
};
use tracing::debug;

use crate::{
    session::ConversationSession,
    timeline::{Fingerprint, Message, Position, Timeline},
    MessagePresenter, Placement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An optimistic entry was matched and confirmed.
    Confirmed { position: Position },
    /// No optimistic entry matched; the message was appended.
    Appended { position: Position },
    /// The message id is already materialized.
    Duplicate,
    /// The event targets another conversation.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenOutcome {
    Applied,
    /// The target is not loaded yet; the receipt waits in the queue.
    Queued,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Message(MergeOutcome),
    Seen(SeenOutcome),
    Typing { shown: bool },
    /// No conversation is open, or the payload could not be normalized.
    Dropped,
}

/// Moves `reader`'s seen marker to the nearest message authored by
/// `local_account` at or before `target`.
pub(crate) fn apply_receipt(
    timeline: &mut Timeline,
    presenter: &dyn MessagePresenter,
    local_account: &AccountId,
    reader: &AccountId,
    member_info: MemberInfo,
    target: &MessageId,
) -> SeenOutcome {
    if reader == local_account {
        return SeenOutcome::Ignored;
    }
    let Some(target_position) = timeline.position_of_id(target) else {
        return SeenOutcome::Ignored;
    };
    let Some(own_position) = timeline.nearest_authored_at_or_before(target_position, local_account)
    else {
        return SeenOutcome::Ignored;
    };
    if !timeline.advance_seen_marker(reader, own_position, member_info.clone()) {
        return SeenOutcome::Ignored;
    }
    if let Some(view) = timeline.view_of(own_position) {
        presenter.move_seen_marker(reader, &member_info, view);
    }
    SeenOutcome::Applied
}

impl ConversationSession {
    pub(crate) fn apply_message_created(&mut self, event: MessageCreated) -> MergeOutcome {
        let MessageCreated { message, status } = event;
        if message.conversation_id != self.conversation_id {
            return MergeOutcome::Ignored;
        }
        if self.timeline.contains_id(&message.message_id) {
            debug!(
                conversation_id = %self.conversation_id,
                message_id = %message.message_id,
                "reconciler: duplicate message event"
            );
            return MergeOutcome::Duplicate;
        }

        self.hide_typing(&message.sender_id);

        if let Some(position) = self.optimistic_match(&message) {
            let already_identified = self
                .timeline
                .entry(position)
                .is_some_and(|entry| entry.message.id.is_some());
            if already_identified {
                return MergeOutcome::Duplicate;
            }
            self.confirm(position, &message);
            return MergeOutcome::Confirmed { position };
        }

        let local = message.sender_id == self.local_account;
        let status = status.unwrap_or(if local {
            MessageStatus::Sent
        } else {
            MessageStatus::Confirmed
        });
        let position = self.timeline.append(Message::from_server(&message, status));
        self.render(position, Placement::Bottom);
        if local {
            self.move_sent_indicator(position);
        } else {
            self.sidebar.unread_count_changed(&self.conversation_id);
        }
        self.sidebar
            .conversation_preview_updated(&self.conversation_id, message.content.trim());
        self.flush_receipts_for(&message.message_id);

        MergeOutcome::Appended { position }
    }

    /// Correlation id first; the content fingerprint only when the event
    /// carries no correlation id at all.
    fn optimistic_match(&self, message: &ServerMessage) -> Option<Position> {
        match &message.temp_correlation_id {
            Some(correlation_id) => self.timeline.position_of_correlation(correlation_id),
            None => self
                .timeline
                .latest_pending_matching(&message.sender_id, &Fingerprint::of_server(message)),
        }
    }

    fn confirm(&mut self, position: Position, message: &ServerMessage) {
        self.timeline
            .assign_id(position, message.message_id.clone());
        let (detached, correlation_id, sender_id) = match self.timeline.entry_mut(position) {
            Some(entry) => {
                entry.message.status = MessageStatus::Confirmed;
                let detached = entry.message.migrate_media(&message.media);
                (
                    detached,
                    entry.message.temp_correlation_id.clone(),
                    entry.message.sender_id.clone(),
                )
            }
            None => return,
        };
        self.refresh(position);
        self.release_detached(detached);
        if let Some(correlation_id) = &correlation_id {
            self.outbox.forget(correlation_id);
        }
        if sender_id == self.local_account {
            self.move_sent_indicator(position);
        }
        self.flush_receipts_for(&message.message_id);

        debug!(
            conversation_id = %self.conversation_id,
            message_id = %message.message_id,
            correlation_id = ?correlation_id,
            "reconciler: confirmed optimistic entry"
        );
    }

    pub(crate) fn apply_message_seen(&mut self, event: MessageSeen) -> SeenOutcome {
        if event.conversation_id != self.conversation_id
            || event.account_id == self.local_account
        {
            return SeenOutcome::Ignored;
        }
        if !self.timeline.contains_id(&event.message_id) {
            self.receipts.enqueue(
                event.conversation_id,
                event.message_id,
                event.account_id,
                event.member_info,
            );
            return SeenOutcome::Queued;
        }
        apply_receipt(
            &mut self.timeline,
            self.presenter.as_ref(),
            &self.local_account,
            &event.account_id,
            event.member_info,
            &event.message_id,
        )
    }

    /// Records a typing notice and returns the sequence a later expiry must
    /// present to hide it.
    pub(crate) fn apply_typing(&mut self, notice: TypingNotice, sequence: u64) -> Option<u64> {
        if notice.conversation_id != self.conversation_id
            || notice.account_id == self.local_account
        {
            return None;
        }
        self.presenter
            .show_typing(&notice.account_id, &notice.member_info);
        self.typing.insert(notice.account_id, sequence);
        Some(sequence)
    }

    pub(crate) fn expire_typing(&mut self, account_id: &AccountId, sequence: u64) -> bool {
        if self.typing.get(account_id) != Some(&sequence) {
            return false;
        }
        self.hide_typing(account_id);
        true
    }

    fn hide_typing(&mut self, account_id: &AccountId) {
        if self.typing.remove(account_id).is_some() {
            self.presenter.hide_typing(account_id);
        }
    }

    /// Merges one history page (oldest first) above the current entries.
    /// Returns how many entries were newly materialized.
    pub(crate) fn apply_history_page(&mut self, items: Vec<ServerMessage>) -> usize {
        let mut materialized = Vec::new();
        for message in items.into_iter().rev() {
            if message.conversation_id != self.conversation_id
                || self.timeline.contains_id(&message.message_id)
            {
                continue;
            }
            let correlated = message
                .temp_correlation_id
                .as_ref()
                .and_then(|correlation_id| self.timeline.position_of_correlation(correlation_id));
            if let Some(position) = correlated {
                let unconfirmed = self
                    .timeline
                    .entry(position)
                    .is_some_and(|entry| entry.message.id.is_none());
                if unconfirmed {
                    self.confirm(position, &message);
                }
                continue;
            }
            let position = self
                .timeline
                .prepend(Message::from_server(&message, MessageStatus::Confirmed));
            self.render(position, Placement::Top);
            materialized.push(message.message_id);
        }

        for message_id in &materialized {
            self.flush_receipts_for(message_id);
        }
        materialized.len()
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
