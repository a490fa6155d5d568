use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;
use shared::{
    domain::{ConversationId, CorrelationId, MediaKind, MessageId, MessageStatus},
    protocol::ServerMessage,
};
use tracing::{debug, warn};

use crate::{
    error::{ConversationError, TransportError},
    session::ConversationSession,
    timeline::{MediaItem, Message, Position},
    transport::SubmitTarget,
    Placement,
};

/// A user-supplied file attached to an outbound message.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub kind: MediaKind,
    pub bytes: Arc<[u8]>,
}

impl OutgoingFile {
    pub fn new(filename: impl Into<String>, kind: MediaKind, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            kind,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// What a retry re-submits. Cached per correlation id from the first send
/// until the message is acknowledged.
#[derive(Debug, Clone)]
pub struct RetryPayload {
    pub content: String,
    pub files: Vec<OutgoingFile>,
}

impl RetryPayload {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.files.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Outbox {
    payloads: HashMap<CorrelationId, RetryPayload>,
    in_flight: HashSet<CorrelationId>,
}

impl Outbox {
    pub(crate) fn is_in_flight(&self, correlation_id: &CorrelationId) -> bool {
        self.in_flight.contains(correlation_id)
    }

    pub(crate) fn forget(&mut self, correlation_id: &CorrelationId) {
        self.payloads.remove(correlation_id);
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubmitJob {
    pub(crate) target: SubmitTarget,
    pub(crate) payload: RetryPayload,
}

/// How a background submission settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Sent { message_id: MessageId },
    Failed { reason: String },
    /// The reconciler confirmed the entry first.
    Duplicate,
    /// The returned id was already on another row, which absorbed the
    /// optimistic entry. `status` is that row's status.
    Merged {
        message_id: MessageId,
        status: MessageStatus,
    },
    /// The conversation was closed or switched before the result arrived.
    Orphaned,
}

pub(crate) fn validate_send(
    conversation_id: &ConversationId,
    content: &str,
    files: &[OutgoingFile],
) -> Result<(), ConversationError> {
    if conversation_id.is_empty() {
        return Err(ConversationError::Validation("conversation id must not be empty"));
    }
    if content.trim().is_empty() && files.is_empty() {
        return Err(ConversationError::Validation(
            "message needs text or at least one attachment",
        ));
    }
    Ok(())
}

pub(crate) fn preview_text(content: &str, files: &[OutgoingFile]) -> String {
    let content = content.trim();
    if !content.is_empty() {
        return content.to_string();
    }
    match files.first().map(|file| file.kind) {
        Some(MediaKind::Video) => "[video]".to_string(),
        Some(MediaKind::Image) => "[image]".to_string(),
        None => String::new(),
    }
}

impl ConversationSession {
    /// Materializes the optimistic entry and returns the submission to run.
    /// Callers validate first.
    pub(crate) fn begin_send(&mut self, content: String, files: Vec<OutgoingFile>) -> SubmitJob {
        let correlation_id = CorrelationId::generate();
        let media = files
            .iter()
            .map(|file| {
                let handle = self.resources.allocate(correlation_id.as_str(), file);
                MediaItem::local(handle, file.kind)
            })
            .collect();

        let message = Message {
            id: None,
            temp_correlation_id: Some(correlation_id.clone()),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.local_account.clone(),
            content: content.clone(),
            media,
            sent_at: Utc::now(),
            status: MessageStatus::Pending,
        };
        let position = self.timeline.append(message);
        self.render(position, Placement::Bottom);

        self.sidebar.conversation_preview_updated(
            &self.conversation_id,
            &preview_text(&content, &files),
        );

        let payload = RetryPayload { content, files };
        self.outbox
            .payloads
            .insert(correlation_id.clone(), payload.clone());
        self.outbox.in_flight.insert(correlation_id.clone());

        debug!(
            conversation_id = %self.conversation_id,
            correlation_id = %correlation_id,
            attachments = payload.files.len(),
            "lifecycle: optimistic entry created"
        );

        SubmitJob {
            target: SubmitTarget {
                conversation_id: self.conversation_id.clone(),
                correlation_id,
            },
            payload,
        }
    }

    pub(crate) fn begin_retry(
        &mut self,
        correlation_id: &CorrelationId,
    ) -> Result<SubmitJob, ConversationError> {
        let Some(payload) = self.outbox.payloads.get(correlation_id).cloned() else {
            return Err(ConversationError::invalid_retry(
                correlation_id,
                "no cached payload for this message",
            ));
        };
        if payload.is_empty() {
            return Err(ConversationError::invalid_retry(
                correlation_id,
                "cached payload is empty",
            ));
        }
        if self.outbox.is_in_flight(correlation_id) {
            return Err(ConversationError::invalid_retry(
                correlation_id,
                "a submission is already outstanding",
            ));
        }
        let Some(position) = self.timeline.position_of_correlation(correlation_id) else {
            return Err(ConversationError::invalid_retry(
                correlation_id,
                "message is not part of this conversation",
            ));
        };
        let Some(entry) = self.timeline.entry_mut(position) else {
            return Err(ConversationError::invalid_retry(
                correlation_id,
                "message is not part of this conversation",
            ));
        };
        if entry.message.status != MessageStatus::Failed {
            return Err(ConversationError::invalid_retry(
                correlation_id,
                "only failed messages can be retried",
            ));
        }

        entry.message.status = MessageStatus::Pending;
        self.refresh(position);
        self.outbox.in_flight.insert(correlation_id.clone());

        debug!(
            conversation_id = %self.conversation_id,
            correlation_id = %correlation_id,
            "lifecycle: retrying submission"
        );

        Ok(SubmitJob {
            target: SubmitTarget {
                conversation_id: self.conversation_id.clone(),
                correlation_id: correlation_id.clone(),
            },
            payload,
        })
    }

    pub(crate) fn complete_submission(
        &mut self,
        correlation_id: &CorrelationId,
        result: Result<ServerMessage, TransportError>,
    ) -> SubmissionOutcome {
        self.outbox.in_flight.remove(correlation_id);

        let Some(position) = self.timeline.position_of_correlation(correlation_id) else {
            return SubmissionOutcome::Orphaned;
        };
        let Some(entry) = self.timeline.entry(position) else {
            return SubmissionOutcome::Orphaned;
        };
        let already_acknowledged = entry.message.id.is_some()
            || matches!(
                entry.message.status,
                MessageStatus::Sent | MessageStatus::Confirmed
            );

        match result {
            Ok(server_message) => {
                if !already_acknowledged {
                    if let Some(existing) = self
                        .timeline
                        .position_of_id(&server_message.message_id)
                        .filter(|existing| *existing != position)
                    {
                        let status = self.collapse_into(position, existing, correlation_id);
                        return SubmissionOutcome::Merged {
                            message_id: server_message.message_id,
                            status,
                        };
                    }
                }
                if already_acknowledged || self.timeline.contains_id(&server_message.message_id) {
                    self.outbox.forget(correlation_id);
                    debug!(
                        conversation_id = %self.conversation_id,
                        correlation_id = %correlation_id,
                        message_id = %server_message.message_id,
                        "lifecycle: submission ack already reconciled, ignoring"
                    );
                    return SubmissionOutcome::Duplicate;
                }
                self.acknowledge(position, correlation_id, &server_message);
                SubmissionOutcome::Sent {
                    message_id: server_message.message_id,
                }
            }
            Err(err) => {
                if already_acknowledged {
                    // The push echo proved the server stored it.
                    self.outbox.forget(correlation_id);
                    return SubmissionOutcome::Duplicate;
                }
                if let Some(entry) = self.timeline.entry_mut(position) {
                    entry.message.status = MessageStatus::Failed;
                }
                self.refresh(position);
                warn!(
                    conversation_id = %self.conversation_id,
                    correlation_id = %correlation_id,
                    error = %err,
                    "lifecycle: submission failed"
                );
                SubmissionOutcome::Failed {
                    reason: err.user_message(),
                }
            }
        }
    }

    /// Drops the optimistic entry at `position` in favour of the row that
    /// already carries its server id. Preview handles are revoked only after
    /// the optimistic view is gone.
    fn collapse_into(
        &mut self,
        position: Position,
        existing: Position,
        correlation_id: &CorrelationId,
    ) -> MessageStatus {
        let displaced = self
            .timeline
            .seen_markers()
            .filter(|(_, marker)| marker.position == position)
            .map(|(account_id, _)| account_id.clone())
            .collect::<Vec<_>>();

        if let Some(view) = self.timeline.remove(position).and_then(|entry| entry.view) {
            self.presenter.remove(view);
        }
        let released = self.resources.release_bucket(correlation_id.as_str());
        self.timeline
            .adopt_correlation(existing, correlation_id.clone());
        self.outbox.forget(correlation_id);

        for account_id in displaced {
            let Some(marker) = self.timeline.seen_marker(&account_id) else {
                continue;
            };
            if let Some(view) = self.timeline.view_of(marker.position) {
                self.presenter
                    .move_seen_marker(&account_id, &marker.member_info, view);
            }
        }

        let status = match self.timeline.entry(existing) {
            Some(entry) => entry.message.status,
            None => MessageStatus::Confirmed,
        };
        if matches!(status, MessageStatus::Sent | MessageStatus::Confirmed) {
            self.move_sent_indicator(existing);
        }

        debug!(
            conversation_id = %self.conversation_id,
            correlation_id = %correlation_id,
            released,
            "lifecycle: optimistic entry merged into existing message"
        );
        status
    }

    fn acknowledge(
        &mut self,
        position: Position,
        correlation_id: &CorrelationId,
        server_message: &ServerMessage,
    ) {
        self.timeline
            .assign_id(position, server_message.message_id.clone());
        let detached = match self.timeline.entry_mut(position) {
            Some(entry) => {
                entry.message.status = MessageStatus::Sent;
                entry.message.migrate_media(&server_message.media)
            }
            None => Vec::new(),
        };
        // Swap the remote references in before any handle is revoked.
        self.refresh(position);
        self.release_detached(detached);
        self.outbox.forget(correlation_id);

        self.flush_receipts_for(&server_message.message_id);
        self.move_sent_indicator(position);

        debug!(
            conversation_id = %self.conversation_id,
            correlation_id = %correlation_id,
            message_id = %server_message.message_id,
            "lifecycle: submission acknowledged"
        );
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
