use std::{sync::Arc, time::Duration};

use shared::{
    domain::{AccountId, ConversationId, CorrelationId, MemberInfo, MessageStatus},
    protocol::{PushEvent, RawPushEvent, ServerMessage},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    error::{ConversationError, TransportError},
    generation::{GenerationGuard, GenerationToken},
    lifecycle::{validate_send, OutgoingFile, SubmissionOutcome, SubmitJob},
    push::{MissingPushChannel, PushChannel},
    reconciler::{MergeOutcome, PushOutcome},
    resources::{InMemoryPreviewStore, PreviewStore},
    session::ConversationSession,
    transport::{MessageTransport, SubmitTarget},
    ClientEvent, HeadlessPresenter, IdentityProvider, Message, MessagePresenter, NoopSidebar,
    SidebarNotifier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { inserted: usize, has_more: bool },
    /// The conversation changed while the page was in flight.
    Stale,
    /// Nothing left to load, or a fetch is already running.
    Skipped,
}

/// A submission running in the background.
#[derive(Debug)]
pub struct SendHandle {
    correlation_id: CorrelationId,
    task: JoinHandle<SubmissionOutcome>,
}

impl SendHandle {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Waits for the submission to settle. `None` if the task was cancelled.
    pub async fn settled(self) -> Option<SubmissionOutcome> {
        match self.task.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(
                    correlation_id = %self.correlation_id,
                    error = %err,
                    "controller: submission task did not complete"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMarkerView {
    pub account_id: AccountId,
    pub member_info: MemberInfo,
    /// Index into [`ConversationSnapshot::messages`].
    pub message_index: usize,
}

#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub generation: u64,
    pub messages: Vec<Message>,
    pub seen_markers: Vec<SeenMarkerView>,
    pub sent_indicator: Option<usize>,
    pub has_more: bool,
    pub loading: bool,
    pub pending_receipts: usize,
    pub in_flight_sends: usize,
}

pub struct ControllerDependencies {
    transport: Arc<dyn MessageTransport>,
    identity: Arc<dyn IdentityProvider>,
    push: Arc<dyn PushChannel>,
    presenter: Arc<dyn MessagePresenter>,
    sidebar: Arc<dyn SidebarNotifier>,
    previews: Arc<dyn PreviewStore>,
}

impl ControllerDependencies {
    pub fn new(transport: Arc<dyn MessageTransport>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            transport,
            identity,
            push: Arc::new(MissingPushChannel),
            presenter: Arc::new(HeadlessPresenter::default()),
            sidebar: Arc::new(NoopSidebar),
            previews: Arc::new(InMemoryPreviewStore::new()),
        }
    }

    pub fn with_push_channel(mut self, push: Arc<dyn PushChannel>) -> Self {
        self.push = push;
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn MessagePresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn with_sidebar(mut self, sidebar: Arc<dyn SidebarNotifier>) -> Self {
        self.sidebar = sidebar;
        self
    }

    pub fn with_preview_store(mut self, previews: Arc<dyn PreviewStore>) -> Self {
        self.previews = previews;
        self
    }
}

struct ControllerState {
    session: Option<ConversationSession>,
    typing_sequence: u64,
}

/// Binds the delivery pipeline to at most one open conversation.
///
/// Session state lives behind a single lock that is never held across a
/// network call; every async completion re-checks its generation token
/// before it touches the session. Only push group commands run under the
/// separate membership lock.
pub struct ConversationController {
    transport: Arc<dyn MessageTransport>,
    identity: Arc<dyn IdentityProvider>,
    push: Arc<dyn PushChannel>,
    presenter: Arc<dyn MessagePresenter>,
    sidebar: Arc<dyn SidebarNotifier>,
    previews: Arc<dyn PreviewStore>,
    page_size: u32,
    typing_ttl: Duration,
    generations: GenerationGuard,
    /// Held from the session swap until the push group commands are sent, so
    /// joins and leaves reach the channel in the order sessions changed.
    membership: Mutex<()>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ClientEvent>,
}

impl ConversationController {
    pub fn new(dependencies: ControllerDependencies, settings: &ClientSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_buffer());
        Arc::new(Self {
            transport: dependencies.transport,
            identity: dependencies.identity,
            push: dependencies.push,
            presenter: dependencies.presenter,
            sidebar: dependencies.sidebar,
            previews: dependencies.previews,
            page_size: settings.page_size(),
            typing_ttl: settings.typing_ttl(),
            generations: GenerationGuard::new(),
            membership: Mutex::new(()),
            inner: Mutex::new(ControllerState {
                session: None,
                typing_sequence: 0,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn active_conversation(&self) -> Option<ConversationId> {
        let guard = self.inner.lock().await;
        guard
            .session
            .as_ref()
            .map(|session| session.conversation_id.clone())
    }

    /// Makes `conversation_id` the active conversation and loads its newest
    /// page. Reopening the active conversation is a no-op.
    pub async fn open_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<LoadOutcome, ConversationError> {
        if conversation_id.is_empty() {
            return Err(ConversationError::Validation(
                "conversation id must not be empty",
            ));
        }

        let membership = self.membership.lock().await;
        let (token, previous) = {
            let mut guard = self.inner.lock().await;
            if guard
                .session
                .as_ref()
                .is_some_and(|session| &session.conversation_id == conversation_id)
            {
                return Ok(LoadOutcome::Skipped);
            }
            let previous = guard.session.take().map(|mut session| {
                session.teardown();
                session.conversation_id.clone()
            });
            let token = self.generations.begin_generation(conversation_id);
            guard.session = Some(ConversationSession::new(
                token.clone(),
                self.identity.local_account_id(),
                Arc::clone(&self.previews),
                Arc::clone(&self.presenter),
                Arc::clone(&self.sidebar),
            ));
            (token, previous)
        };

        if let Some(previous) = previous {
            self.leave(&previous).await;
            let _ = self.events.send(ClientEvent::ConversationClosed {
                conversation_id: previous,
            });
        }
        if let Err(err) = self.push.join_group(&conversation_id.push_group()).await {
            warn!(
                conversation_id = %conversation_id,
                error = %err,
                "controller: failed to join push group"
            );
        }
        drop(membership);
        self.sidebar.unread_count_changed(conversation_id);

        info!(
            conversation_id = %conversation_id,
            generation = token.value(),
            "controller: conversation opened"
        );
        let _ = self.events.send(ClientEvent::ConversationOpened {
            conversation_id: conversation_id.clone(),
            generation: token.value(),
        });

        self.load_page(token).await
    }

    /// Tears down the active conversation. Returns `false` if none was open.
    pub async fn close_conversation(&self) -> bool {
        let _membership = self.membership.lock().await;
        let closed = {
            let mut guard = self.inner.lock().await;
            self.generations.invalidate();
            guard.session.take().map(|mut session| {
                session.teardown();
                session.conversation_id.clone()
            })
        };
        let Some(conversation_id) = closed else {
            return false;
        };
        self.leave(&conversation_id).await;
        info!(conversation_id = %conversation_id, "controller: conversation closed");
        let _ = self
            .events
            .send(ClientEvent::ConversationClosed { conversation_id });
        true
    }

    async fn leave(&self, conversation_id: &ConversationId) {
        if let Err(err) = self.push.leave_group(&conversation_id.push_group()).await {
            warn!(
                conversation_id = %conversation_id,
                error = %err,
                "controller: failed to leave push group"
            );
        }
    }

    /// Fetches the next older page of the active conversation.
    pub async fn load_older(&self) -> Result<LoadOutcome, ConversationError> {
        let token = {
            let guard = self.inner.lock().await;
            guard
                .session
                .as_ref()
                .map(|session| session.generation.clone())
                .ok_or(ConversationError::NoActiveConversation)?
        };
        self.load_page(token).await
    }

    async fn load_page(&self, token: GenerationToken) -> Result<LoadOutcome, ConversationError> {
        let (conversation_id, page) = {
            let mut guard = self.inner.lock().await;
            let Some(session) = guard
                .session
                .as_mut()
                .filter(|session| session.is_generation(&token))
            else {
                return Ok(LoadOutcome::Stale);
            };
            if session.paging.in_flight || !session.paging.has_more {
                return Ok(LoadOutcome::Skipped);
            }
            session.paging.in_flight = true;
            (session.conversation_id.clone(), session.paging.next_page)
        };

        let result = self
            .transport
            .fetch_messages(&conversation_id, page, self.page_size)
            .await;

        let mut guard = self.inner.lock().await;
        let session = guard
            .session
            .as_mut()
            .filter(|session| session.is_generation(&token));
        let Some(session) = session.filter(|_| self.generations.is_current(&token)) else {
            debug!(
                conversation_id = %conversation_id,
                generation = token.value(),
                page,
                "controller: discarding stale page"
            );
            return Ok(LoadOutcome::Stale);
        };
        session.paging.in_flight = false;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    page,
                    error = %err,
                    "controller: failed to load history page"
                );
                let _ = self.events.send(ClientEvent::Error(format!(
                    "failed to load messages for {conversation_id}: {err}"
                )));
                return Err(err.into());
            }
        };

        let inserted = session.apply_history_page(fetched.items);
        session.paging.next_page = page + 1;
        session.paging.has_more = fetched.has_more;
        debug!(
            conversation_id = %conversation_id,
            page,
            inserted,
            has_more = fetched.has_more,
            "controller: applied history page"
        );
        Ok(LoadOutcome::Applied {
            inserted,
            has_more: fetched.has_more,
        })
    }

    /// Validates and renders the message immediately, then submits it in the
    /// background.
    pub async fn send(
        self: &Arc<Self>,
        conversation_id: &ConversationId,
        content: impl Into<String>,
        files: Vec<OutgoingFile>,
    ) -> Result<SendHandle, ConversationError> {
        let content = content.into();
        validate_send(conversation_id, &content, &files)?;

        let job = {
            let mut guard = self.inner.lock().await;
            let session = guard
                .session
                .as_mut()
                .ok_or(ConversationError::NoActiveConversation)?;
            if &session.conversation_id != conversation_id {
                return Err(ConversationError::NotActive(conversation_id.clone()));
            }
            session.begin_send(content, files)
        };
        Ok(self.submit(job))
    }

    /// Re-submits a failed message with its original payload.
    pub async fn retry(
        self: &Arc<Self>,
        correlation_id: &CorrelationId,
    ) -> Result<SendHandle, ConversationError> {
        let job = {
            let mut guard = self.inner.lock().await;
            let session = guard
                .session
                .as_mut()
                .ok_or(ConversationError::NoActiveConversation)?;
            session.begin_retry(correlation_id)?
        };
        Ok(self.submit(job))
    }

    fn submit(self: &Arc<Self>, job: SubmitJob) -> SendHandle {
        let correlation_id = job.target.correlation_id.clone();
        let _ = self.events.send(ClientEvent::MessageStatusChanged {
            conversation_id: job.target.conversation_id.clone(),
            correlation_id: Some(correlation_id.clone()),
            message_id: None,
            status: MessageStatus::Pending,
        });

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let SubmitJob { target, payload } = job;
            let result = controller
                .transport
                .submit_message(&target, &payload.content, &payload.files)
                .await;
            controller.finish_submission(&target, result).await
        });
        SendHandle {
            correlation_id,
            task,
        }
    }

    async fn finish_submission(
        &self,
        target: &SubmitTarget,
        result: Result<ServerMessage, TransportError>,
    ) -> SubmissionOutcome {
        let preview = result
            .as_ref()
            .ok()
            .map(|message| message.content.trim().to_string());

        let outcome = {
            let mut guard = self.inner.lock().await;
            match guard
                .session
                .as_mut()
                .filter(|session| session.conversation_id == target.conversation_id)
            {
                Some(session) => session.complete_submission(&target.correlation_id, result),
                None => SubmissionOutcome::Orphaned,
            }
        };

        match &outcome {
            SubmissionOutcome::Sent { message_id } => {
                let _ = self.events.send(ClientEvent::MessageStatusChanged {
                    conversation_id: target.conversation_id.clone(),
                    correlation_id: Some(target.correlation_id.clone()),
                    message_id: Some(message_id.clone()),
                    status: MessageStatus::Sent,
                });
            }
            SubmissionOutcome::Failed { reason } => {
                let _ = self.events.send(ClientEvent::MessageFailed {
                    conversation_id: target.conversation_id.clone(),
                    correlation_id: target.correlation_id.clone(),
                    reason: reason.clone(),
                });
            }
            SubmissionOutcome::Merged { message_id, status } => {
                let _ = self.events.send(ClientEvent::MessageStatusChanged {
                    conversation_id: target.conversation_id.clone(),
                    correlation_id: Some(target.correlation_id.clone()),
                    message_id: Some(message_id.clone()),
                    status: *status,
                });
            }
            SubmissionOutcome::Duplicate => {}
            SubmissionOutcome::Orphaned => {
                debug!(
                    conversation_id = %target.conversation_id,
                    correlation_id = %target.correlation_id,
                    "controller: submission settled after its conversation closed"
                );
                if let Some(preview) = preview {
                    self.sidebar
                        .conversation_preview_updated(&target.conversation_id, &preview);
                }
            }
        }
        outcome
    }

    /// Applies one canonical push event to the active conversation.
    pub async fn handle_push(self: &Arc<Self>, event: PushEvent) -> PushOutcome {
        let mut guard = self.inner.lock().await;
        let ControllerState {
            session,
            typing_sequence,
        } = &mut *guard;
        let Some(session) = session.as_mut() else {
            debug!(
                conversation_id = %event.conversation_id(),
                "controller: no open conversation, dropping push event"
            );
            return PushOutcome::Dropped;
        };

        match event {
            PushEvent::MessageCreated(created) => {
                let outcome = session.apply_message_created(created);
                if let MergeOutcome::Confirmed { position } = outcome {
                    if let Some(entry) = session.timeline.entry(position) {
                        let _ = self.events.send(ClientEvent::MessageStatusChanged {
                            conversation_id: session.conversation_id.clone(),
                            correlation_id: entry.message.temp_correlation_id.clone(),
                            message_id: entry.message.id.clone(),
                            status: entry.message.status,
                        });
                    }
                }
                PushOutcome::Message(outcome)
            }
            PushEvent::MessageSeen(seen) => PushOutcome::Seen(session.apply_message_seen(seen)),
            PushEvent::Typing(notice) => {
                *typing_sequence += 1;
                let account_id = notice.account_id.clone();
                let Some(sequence) = session.apply_typing(notice, *typing_sequence) else {
                    return PushOutcome::Typing { shown: false };
                };
                self.schedule_typing_expiry(session.generation.clone(), account_id, sequence);
                PushOutcome::Typing { shown: true }
            }
        }
    }

    /// Normalizes a raw push frame and applies it. Malformed frames are
    /// dropped.
    pub async fn handle_raw_push(self: &Arc<Self>, raw: RawPushEvent) -> PushOutcome {
        match raw.normalize() {
            Ok(event) => self.handle_push(event).await,
            Err(err) => {
                warn!(error = %err, "controller: dropping malformed push payload");
                PushOutcome::Dropped
            }
        }
    }

    /// Feeds every frame from `events` through [`Self::handle_raw_push`] in
    /// arrival order until the sender side closes.
    pub fn attach_push_stream(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<RawPushEvent>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                controller.handle_raw_push(raw).await;
            }
            info!("controller: push stream ended");
        })
    }

    fn schedule_typing_expiry(
        self: &Arc<Self>,
        token: GenerationToken,
        account_id: AccountId,
        sequence: u64,
    ) {
        let controller = Arc::clone(self);
        let ttl = self.typing_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut guard = controller.inner.lock().await;
            if let Some(session) = guard
                .session
                .as_mut()
                .filter(|session| session.is_generation(&token))
            {
                session.expire_typing(&account_id, sequence);
            }
        });
    }

    pub async fn snapshot(&self) -> Option<ConversationSnapshot> {
        let guard = self.inner.lock().await;
        let session = guard.session.as_ref()?;
        let timeline = &session.timeline;

        let mut seen_markers = timeline
            .seen_markers()
            .filter_map(|(account_id, marker)| {
                Some(SeenMarkerView {
                    account_id: account_id.clone(),
                    member_info: marker.member_info.clone(),
                    message_index: timeline.index_of(marker.position)?,
                })
            })
            .collect::<Vec<_>>();
        seen_markers.sort_by(|a, b| a.account_id.as_str().cmp(b.account_id.as_str()));

        Some(ConversationSnapshot {
            conversation_id: session.conversation_id.clone(),
            generation: session.generation.value(),
            messages: timeline.messages().cloned().collect(),
            seen_markers,
            sent_indicator: timeline
                .sent_indicator()
                .and_then(|position| timeline.index_of(position)),
            has_more: session.paging.has_more,
            loading: session.paging.in_flight,
            pending_receipts: session.receipts.len(),
            in_flight_sends: session.outbox.in_flight_count(),
        })
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
