use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use shared::{
    domain::{
        AccountId, ConversationId, CorrelationId, LocalHandle, MediaKind, MemberInfo, MessageId,
        MessageStatus,
    },
    protocol::{RemoteMedia, ServerMessage},
};

use crate::ViewRef;

/// Ordering key of an entry. History pages are inserted below the lowest
/// position, live messages above the highest.
pub type Position = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub local_handle: Option<LocalHandle>,
    pub remote_url: Option<String>,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn local(handle: LocalHandle, kind: MediaKind) -> Self {
        Self {
            local_handle: Some(handle),
            remote_url: None,
            kind,
        }
    }

    pub fn remote(media: &RemoteMedia) -> Self {
        Self {
            local_handle: None,
            remote_url: Some(media.url.clone()),
            kind: media.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Option<MessageId>,
    pub temp_correlation_id: Option<CorrelationId>,
    pub conversation_id: ConversationId,
    pub sender_id: AccountId,
    pub content: String,
    pub media: Vec<MediaItem>,
    pub sent_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    pub fn from_server(message: &ServerMessage, status: MessageStatus) -> Self {
        Self {
            id: Some(message.message_id.clone()),
            temp_correlation_id: message.temp_correlation_id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            media: message.media.iter().map(MediaItem::remote).collect(),
            sent_at: message.sent_at,
            status,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.content, self.media.iter().map(|item| item.kind))
    }

    /// Moves media onto the remote references returned by the server, pairing
    /// items by index. Returns the local handles that no longer back anything.
    pub fn migrate_media(&mut self, remote: &[RemoteMedia]) -> Vec<LocalHandle> {
        let mut detached = Vec::new();
        for (item, remote) in self.media.iter_mut().zip(remote) {
            item.remote_url = Some(remote.url.clone());
            if let Some(handle) = item.local_handle.take() {
                detached.push(handle);
            }
        }
        detached
    }

    pub fn local_handles(&self) -> impl Iterator<Item = LocalHandle> + '_ {
        self.media.iter().filter_map(|item| item.local_handle)
    }
}

/// Content/media shape used to pair an echo with an optimistic entry when
/// no correlation id came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    content: String,
    media: Vec<MediaKind>,
}

impl Fingerprint {
    pub fn new(content: &str, media: impl IntoIterator<Item = MediaKind>) -> Self {
        Self {
            content: content.trim().to_string(),
            media: media.into_iter().collect(),
        }
    }

    pub fn of_server(message: &ServerMessage) -> Self {
        Self::new(&message.content, message.media.iter().map(|item| item.kind))
    }
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub message: Message,
    pub view: Option<ViewRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMarker {
    pub position: Position,
    pub member_info: MemberInfo,
}

/// Explicit index of materialized messages for one conversation. The
/// presenter renders a projection of this; it is never consulted for state.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: BTreeMap<Position, TimelineEntry>,
    by_id: HashMap<MessageId, Position>,
    by_correlation: HashMap<CorrelationId, Position>,
    seen_markers: HashMap<AccountId, SeenMarker>,
    sent_indicator: Option<Position>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) -> Position {
        let position = self
            .entries
            .last_key_value()
            .map_or(0, |(position, _)| position + 1);
        self.insert(position, message);
        position
    }

    pub fn prepend(&mut self, message: Message) -> Position {
        let position = self
            .entries
            .first_key_value()
            .map_or(0, |(position, _)| position - 1);
        self.insert(position, message);
        position
    }

    fn insert(&mut self, position: Position, message: Message) {
        if let Some(id) = &message.id {
            self.by_id.insert(id.clone(), position);
        }
        if let Some(correlation_id) = &message.temp_correlation_id {
            self.by_correlation.insert(correlation_id.clone(), position);
        }
        self.entries.insert(
            position,
            TimelineEntry {
                message,
                view: None,
            },
        );
    }

    pub fn entry(&self, position: Position) -> Option<&TimelineEntry> {
        self.entries.get(&position)
    }

    pub fn entry_mut(&mut self, position: Position) -> Option<&mut TimelineEntry> {
        self.entries.get_mut(&position)
    }

    pub fn view_of(&self, position: Position) -> Option<ViewRef> {
        self.entries.get(&position).and_then(|entry| entry.view)
    }

    pub fn set_view(&mut self, position: Position, view: ViewRef) {
        if let Some(entry) = self.entries.get_mut(&position) {
            entry.view = Some(view);
        }
    }

    pub fn position_of_id(&self, id: &MessageId) -> Option<Position> {
        self.by_id.get(id).copied()
    }

    pub fn position_of_correlation(&self, correlation_id: &CorrelationId) -> Option<Position> {
        self.by_correlation.get(correlation_id).copied()
    }

    pub fn contains_id(&self, id: &MessageId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Records the server id of an entry. Callers check for collisions first.
    pub fn assign_id(&mut self, position: Position, id: MessageId) {
        if let Some(entry) = self.entries.get_mut(&position) {
            self.by_id.insert(id.clone(), position);
            entry.message.id = Some(id);
        }
    }

    /// Points `correlation_id` at an existing entry that has none yet.
    pub fn adopt_correlation(&mut self, position: Position, correlation_id: CorrelationId) {
        if let Some(entry) = self.entries.get_mut(&position) {
            if entry.message.temp_correlation_id.is_none() {
                entry.message.temp_correlation_id = Some(correlation_id.clone());
            }
            self.by_correlation.insert(correlation_id, position);
        }
    }

    /// Drops an entry and its index slots. Seen markers on it fall back to
    /// the previous entry, or disappear when there is none. The sent
    /// indicator is cleared if it sat there.
    pub fn remove(&mut self, position: Position) -> Option<TimelineEntry> {
        let entry = self.entries.remove(&position)?;
        if let Some(id) = &entry.message.id {
            if self.by_id.get(id) == Some(&position) {
                self.by_id.remove(id);
            }
        }
        if let Some(correlation_id) = &entry.message.temp_correlation_id {
            if self.by_correlation.get(correlation_id) == Some(&position) {
                self.by_correlation.remove(correlation_id);
            }
        }
        if self.sent_indicator == Some(position) {
            self.sent_indicator = None;
        }
        let fallback = self
            .entries
            .range(..position)
            .next_back()
            .map(|(position, _)| *position);
        self.seen_markers
            .retain(|_, marker| match (marker.position == position, fallback) {
                (false, _) => true,
                (true, Some(previous)) => {
                    marker.position = previous;
                    true
                }
                (true, None) => false,
            });
        Some(entry)
    }

    /// Most recently created pending entry from `sender` with the same shape.
    pub fn latest_pending_matching(
        &self,
        sender: &AccountId,
        fingerprint: &Fingerprint,
    ) -> Option<Position> {
        self.entries
            .iter()
            .rev()
            .find(|(_, entry)| {
                let message = &entry.message;
                message.status == MessageStatus::Pending
                    && message.id.is_none()
                    && &message.sender_id == sender
                    && &message.fingerprint() == fingerprint
            })
            .map(|(position, _)| *position)
    }

    pub fn nearest_authored_at_or_before(
        &self,
        position: Position,
        author: &AccountId,
    ) -> Option<Position> {
        self.entries
            .range(..=position)
            .rev()
            .find(|(_, entry)| &entry.message.sender_id == author)
            .map(|(position, _)| *position)
    }

    pub fn seen_marker(&self, account_id: &AccountId) -> Option<&SeenMarker> {
        self.seen_markers.get(account_id)
    }

    pub fn seen_markers(&self) -> impl Iterator<Item = (&AccountId, &SeenMarker)> {
        self.seen_markers.iter()
    }

    /// Moves the reader's marker forward. Returns `false` when the marker is
    /// already at or past `position`.
    pub fn advance_seen_marker(
        &mut self,
        account_id: &AccountId,
        position: Position,
        member_info: MemberInfo,
    ) -> bool {
        if let Some(existing) = self.seen_markers.get(account_id) {
            if existing.position >= position {
                return false;
            }
        }
        self.seen_markers.insert(
            account_id.clone(),
            SeenMarker {
                position,
                member_info,
            },
        );
        true
    }

    pub fn sent_indicator(&self) -> Option<Position> {
        self.sent_indicator
    }

    /// Returns the position that showed the indicator before, if different.
    pub fn move_sent_indicator(&mut self, position: Position) -> Option<Position> {
        match self.sent_indicator.replace(position) {
            Some(previous) if previous != position => Some(previous),
            _ => None,
        }
    }

    /// Zero-based rank of `position` in display order.
    pub fn index_of(&self, position: Position) -> Option<usize> {
        self.entries
            .contains_key(&position)
            .then(|| self.entries.range(..position).count())
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.values().map(|entry| &entry.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
