use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex as StdMutex,
};

use super::*;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{MediaKind, MessageId},
    protocol::{MessageCreated, MessageSeen, Page, RawMessageSeen, RemoteMedia, TypingNotice},
};
use tokio::sync::{broadcast::error::TryRecvError, Notify};

use crate::{
    reconciler::SeenOutcome,
    test_support::{
        member, server_message, PresenterCall, RecordingPresenter, RecordingSidebar, SidebarCall,
    },
    StaticIdentity,
};

enum SubmitStep {
    Succeed(&'static str),
    Fail(TransportError),
}

#[derive(Default)]
struct FakeTransport {
    fetches: StdMutex<Vec<(ConversationId, u32)>>,
    pages: StdMutex<HashMap<(ConversationId, u32), Page<ServerMessage>>>,
    fetch_gates: StdMutex<HashMap<ConversationId, Arc<Notify>>>,
    submissions: StdMutex<Vec<(SubmitTarget, String, usize)>>,
    script: StdMutex<VecDeque<SubmitStep>>,
    submit_gate: StdMutex<Option<Arc<Notify>>>,
}

impl FakeTransport {
    fn set_page(&self, conversation: &str, page: u32, items: Vec<ServerMessage>, has_more: bool) {
        self.pages.lock().expect("pages").insert(
            (ConversationId::new(conversation), page),
            Page {
                items,
                page,
                has_more,
            },
        );
    }

    fn gate_fetches(&self, conversation: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.fetch_gates
            .lock()
            .expect("gates")
            .insert(ConversationId::new(conversation), gate.clone());
        gate
    }

    fn gate_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().expect("gate") = Some(gate.clone());
        gate
    }

    fn script(&self, step: SubmitStep) {
        self.script.lock().expect("script").push_back(step);
    }

    fn fetch_count(&self, conversation: &str) -> usize {
        let conversation = ConversationId::new(conversation);
        self.fetches
            .lock()
            .expect("fetches")
            .iter()
            .filter(|(id, _)| *id == conversation)
            .count()
    }

    fn submissions(&self) -> Vec<(SubmitTarget, String, usize)> {
        self.submissions.lock().expect("submissions").clone()
    }
}

#[async_trait]
impl MessageTransport for FakeTransport {
    async fn submit_message(
        &self,
        target: &SubmitTarget,
        content: &str,
        files: &[OutgoingFile],
    ) -> Result<ServerMessage, TransportError> {
        self.submissions.lock().expect("submissions").push((
            target.clone(),
            content.to_string(),
            files.len(),
        ));
        let gate = self.submit_gate.lock().expect("gate").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let step = self.script.lock().expect("script").pop_front();
        match step.unwrap_or(SubmitStep::Succeed("m1")) {
            SubmitStep::Succeed(id) => Ok(ServerMessage {
                message_id: id.into(),
                conversation_id: target.conversation_id.clone(),
                sender_id: AccountId::new("me"),
                content: content.to_string(),
                media: files
                    .iter()
                    .map(|file| RemoteMedia {
                        url: format!("https://cdn.test/{}", file.filename),
                        kind: file.kind,
                    })
                    .collect(),
                sent_at: Utc::now(),
                temp_correlation_id: Some(target.correlation_id.clone()),
            }),
            SubmitStep::Fail(err) => Err(err),
        }
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        _page_size: u32,
    ) -> Result<Page<ServerMessage>, TransportError> {
        self.fetches
            .lock()
            .expect("fetches")
            .push((conversation_id.clone(), page));
        let gate = self
            .fetch_gates
            .lock()
            .expect("gates")
            .get(conversation_id)
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let stored = self
            .pages
            .lock()
            .expect("pages")
            .get(&(conversation_id.clone(), page))
            .cloned();
        Ok(stored.unwrap_or(Page {
            items: Vec::new(),
            page,
            has_more: false,
        }))
    }
}

#[derive(Default)]
struct RecordingPush {
    commands: StdMutex<Vec<String>>,
    join_attempts: StdMutex<Vec<String>>,
    join_gates: StdMutex<HashMap<String, Arc<Notify>>>,
}

impl RecordingPush {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands").clone()
    }

    /// Holds the join for `group` until the returned gate is notified; the
    /// command is recorded once it is let through.
    fn gate_join(&self, group: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.join_gates
            .lock()
            .expect("gates")
            .insert(group.to_string(), gate.clone());
        gate
    }

    fn join_attempted(&self, group: &str) -> bool {
        self.join_attempts
            .lock()
            .expect("attempts")
            .iter()
            .any(|attempt| attempt == group)
    }
}

#[async_trait]
impl PushChannel for RecordingPush {
    async fn join_group(&self, group: &str) -> Result<()> {
        self.join_attempts
            .lock()
            .expect("attempts")
            .push(group.to_string());
        let gate = self.join_gates.lock().expect("gates").get(group).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.commands
            .lock()
            .expect("commands")
            .push(format!("join {group}"));
        Ok(())
    }

    async fn leave_group(&self, group: &str) -> Result<()> {
        self.commands
            .lock()
            .expect("commands")
            .push(format!("leave {group}"));
        Ok(())
    }
}

struct Harness {
    controller: Arc<ConversationController>,
    transport: Arc<FakeTransport>,
    push: Arc<RecordingPush>,
    presenter: Arc<RecordingPresenter>,
    sidebar: Arc<RecordingSidebar>,
    previews: Arc<InMemoryPreviewStore>,
}

fn harness_with(settings: ClientSettings) -> Harness {
    let transport = Arc::new(FakeTransport::default());
    let push = Arc::new(RecordingPush::default());
    let presenter = Arc::new(RecordingPresenter::default());
    let sidebar = Arc::new(RecordingSidebar::default());
    let previews = Arc::new(InMemoryPreviewStore::new());
    let dependencies = ControllerDependencies::new(
        transport.clone(),
        Arc::new(StaticIdentity(AccountId::new("me"))),
    )
    .with_push_channel(push.clone())
    .with_presenter(presenter.clone())
    .with_sidebar(sidebar.clone())
    .with_preview_store(previews.clone());
    Harness {
        controller: ConversationController::new(dependencies, &settings),
        transport,
        push,
        presenter,
        sidebar,
        previews,
    }
}

fn harness() -> Harness {
    harness_with(ClientSettings::default())
}

fn conversation(id: &str) -> ConversationId {
    ConversationId::new(id)
}

fn message_in(conversation: &str, id: &str, sender: &str, content: &str) -> ServerMessage {
    ServerMessage {
        conversation_id: ConversationId::new(conversation),
        ..server_message(id, sender, content)
    }
}

async fn snapshot(harness: &Harness) -> ConversationSnapshot {
    harness
        .controller
        .snapshot()
        .await
        .expect("conversation is open")
}

async fn wait_for_fetches(harness: &Harness, conversation: &str, count: usize) {
    for _ in 0..1_000 {
        if harness.transport.fetch_count(conversation) >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("fetch for {conversation} never started");
}

fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return drained,
        }
    }
}

#[tokio::test]
async fn empty_send_is_rejected_without_network() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");

    let err = harness
        .controller
        .send(&conversation("c1"), "   ", Vec::new())
        .await
        .expect_err("empty send");

    assert!(matches!(err, ConversationError::Validation(_)));
    assert!(harness.transport.submissions().is_empty());
    assert!(snapshot(&harness).await.messages.is_empty());
}

#[tokio::test]
async fn send_requires_the_active_conversation() {
    let harness = harness();
    let err = harness
        .controller
        .send(&conversation("c1"), "hi", Vec::new())
        .await
        .expect_err("nothing open");
    assert!(matches!(err, ConversationError::NoActiveConversation));

    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let err = harness
        .controller
        .send(&conversation("c2"), "hi", Vec::new())
        .await
        .expect_err("other conversation");
    assert!(matches!(err, ConversationError::NotActive(_)));
}

#[tokio::test]
async fn successful_send_goes_from_pending_to_sent() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let mut events = harness.controller.subscribe_events();
    let gate = harness.transport.gate_submissions();

    let handle = harness
        .controller
        .send(&conversation("c1"), "hello", Vec::new())
        .await
        .expect("send");

    let pending = snapshot(&harness).await;
    assert_eq!(pending.messages.len(), 1);
    assert_eq!(pending.messages[0].status, MessageStatus::Pending);
    assert_eq!(pending.messages[0].id, None);
    assert_eq!(
        pending.messages[0].temp_correlation_id.as_ref(),
        Some(handle.correlation_id())
    );

    gate.notify_one();
    let correlation_id = handle.correlation_id().clone();
    assert_eq!(
        handle.settled().await,
        Some(SubmissionOutcome::Sent {
            message_id: MessageId::new("m1")
        })
    );

    let settled = snapshot(&harness).await;
    assert_eq!(settled.messages.len(), 1);
    assert_eq!(settled.messages[0].status, MessageStatus::Sent);
    assert_eq!(settled.messages[0].id, Some(MessageId::new("m1")));
    assert_eq!(settled.sent_indicator, Some(0));
    assert_eq!(settled.in_flight_sends, 0);

    assert_eq!(
        drain(&mut events),
        vec![
            ClientEvent::MessageStatusChanged {
                conversation_id: conversation("c1"),
                correlation_id: Some(correlation_id.clone()),
                message_id: None,
                status: MessageStatus::Pending,
            },
            ClientEvent::MessageStatusChanged {
                conversation_id: conversation("c1"),
                correlation_id: Some(correlation_id),
                message_id: Some(MessageId::new("m1")),
                status: MessageStatus::Sent,
            },
        ]
    );
}

#[tokio::test]
async fn failed_send_can_be_retried_with_the_original_payload() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    harness
        .transport
        .script(SubmitStep::Fail(TransportError::Connection("reset".into())));
    harness.transport.script(SubmitStep::Succeed("m1"));
    let mut events = harness.controller.subscribe_events();

    let file = OutgoingFile::new("a.png", MediaKind::Image, vec![7u8; 4]);
    let handle = harness
        .controller
        .send(&conversation("c1"), "hi", vec![file])
        .await
        .expect("send");
    let correlation_id = handle.correlation_id().clone();
    assert!(matches!(
        handle.settled().await,
        Some(SubmissionOutcome::Failed { .. })
    ));

    let failed = snapshot(&harness).await;
    assert_eq!(failed.messages[0].status, MessageStatus::Failed);
    assert_eq!(harness.previews.live_count(), 1);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, ClientEvent::MessageFailed { .. })));

    let retry = harness
        .controller
        .retry(&correlation_id)
        .await
        .expect("retry");
    assert_eq!(
        retry.settled().await,
        Some(SubmissionOutcome::Sent {
            message_id: MessageId::new("m1")
        })
    );

    let settled = snapshot(&harness).await;
    assert_eq!(settled.messages.len(), 1);
    assert_eq!(settled.messages[0].status, MessageStatus::Sent);
    assert_eq!(
        settled.messages[0].media[0].remote_url.as_deref(),
        Some("https://cdn.test/a.png")
    );
    assert_eq!(harness.previews.live_count(), 0);
    assert_eq!(harness.previews.revocations().len(), 1);

    let submissions = harness.transport.submissions();
    assert_eq!(submissions.len(), 2);
    assert!(submissions
        .iter()
        .all(|(target, content, files)| target.correlation_id == correlation_id
            && content == "hi"
            && *files == 1));
}

#[tokio::test]
async fn retry_is_refused_while_a_submission_is_outstanding() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let gate = harness.transport.gate_submissions();

    let handle = harness
        .controller
        .send(&conversation("c1"), "hi", Vec::new())
        .await
        .expect("send");
    let err = harness
        .controller
        .retry(handle.correlation_id())
        .await
        .expect_err("still in flight");
    assert!(matches!(err, ConversationError::InvalidRetryState { .. }));

    gate.notify_one();
    handle.settled().await;
}

#[tokio::test]
async fn push_echo_before_ack_confirms_once_and_late_ack_is_ignored() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let gate = harness.transport.gate_submissions();
    harness.transport.script(SubmitStep::Succeed("m2"));

    let handle = harness
        .controller
        .send(&conversation("c1"), "hey", Vec::new())
        .await
        .expect("send");
    let echo = ServerMessage {
        temp_correlation_id: Some(handle.correlation_id().clone()),
        ..message_in("c1", "M2", "me", "hey")
    };

    let outcome = harness
        .controller
        .handle_push(PushEvent::MessageCreated(MessageCreated {
            message: echo,
            status: None,
        }))
        .await;
    assert!(matches!(
        outcome,
        PushOutcome::Message(MergeOutcome::Confirmed { .. })
    ));

    gate.notify_one();
    assert_eq!(handle.settled().await, Some(SubmissionOutcome::Duplicate));

    let settled = snapshot(&harness).await;
    assert_eq!(settled.messages.len(), 1);
    assert_eq!(settled.messages[0].id, Some(MessageId::new("m2")));
    assert_eq!(settled.messages[0].status, MessageStatus::Confirmed);
}

#[tokio::test]
async fn queued_receipt_attaches_once_when_pagination_loads_its_target() {
    let harness = harness();
    harness.transport.set_page(
        "c1",
        0,
        vec![message_in("c1", "m4", "bob", "latest")],
        true,
    );
    harness.transport.set_page(
        "c1",
        1,
        vec![
            message_in("c1", "m2", "me", "mine"),
            message_in("c1", "m3", "bob", "theirs"),
        ],
        false,
    );
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");

    let outcome = harness
        .controller
        .handle_push(PushEvent::MessageSeen(MessageSeen {
            conversation_id: conversation("c1"),
            message_id: MessageId::new("m3"),
            account_id: AccountId::new("bob"),
            member_info: member("Bob"),
        }))
        .await;
    assert_eq!(outcome, PushOutcome::Seen(SeenOutcome::Queued));
    assert_eq!(snapshot(&harness).await.pending_receipts, 1);

    let loaded = harness.controller.load_older().await.expect("load older");
    assert_eq!(
        loaded,
        LoadOutcome::Applied {
            inserted: 2,
            has_more: false
        }
    );

    let view = snapshot(&harness).await;
    assert_eq!(view.pending_receipts, 0);
    assert_eq!(
        view.messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>(),
        vec!["mine", "theirs", "latest"]
    );
    assert_eq!(
        view.seen_markers,
        vec![SeenMarkerView {
            account_id: AccountId::new("bob"),
            member_info: member("Bob"),
            message_index: 0,
        }]
    );
    let marker_moves = harness
        .presenter
        .calls()
        .into_iter()
        .filter(|call| matches!(call, PresenterCall::SeenMarker { .. }))
        .count();
    assert_eq!(marker_moves, 1);

    assert_eq!(
        harness.controller.load_older().await.expect("no more"),
        LoadOutcome::Skipped
    );
}

#[tokio::test]
async fn switching_conversations_discards_the_stale_page() {
    let harness = harness();
    harness
        .transport
        .set_page("a", 0, vec![message_in("a", "a1", "bob", "from a")], false);
    harness
        .transport
        .set_page("b", 0, vec![message_in("b", "b1", "bob", "from b")], false);
    let gate = harness.transport.gate_fetches("a");

    let controller = harness.controller.clone();
    let opening_a =
        tokio::spawn(async move { controller.open_conversation(&ConversationId::new("a")).await });
    wait_for_fetches(&harness, "a", 1).await;

    let opened_b = harness
        .controller
        .open_conversation(&conversation("b"))
        .await
        .expect("open b");
    assert_eq!(
        opened_b,
        LoadOutcome::Applied {
            inserted: 1,
            has_more: false
        }
    );

    gate.notify_one();
    let stale = opening_a.await.expect("join").expect("open a");
    assert_eq!(stale, LoadOutcome::Stale);

    let view = snapshot(&harness).await;
    assert_eq!(view.conversation_id, conversation("b"));
    assert_eq!(view.generation, 2);
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].content, "from b");
    assert_eq!(
        harness.push.commands(),
        vec![
            "join conversation:a".to_string(),
            "leave conversation:a".to_string(),
            "join conversation:b".to_string(),
        ]
    );
}

#[tokio::test]
async fn slow_join_cannot_outlive_a_switch() {
    let harness = harness();
    let gate = harness.push.gate_join("conversation:a");

    let controller = harness.controller.clone();
    let opening_a =
        tokio::spawn(async move { controller.open_conversation(&ConversationId::new("a")).await });
    for _ in 0..1_000 {
        if harness.push.join_attempted("conversation:a") {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(harness.push.join_attempted("conversation:a"));

    let controller = harness.controller.clone();
    let opening_b =
        tokio::spawn(async move { controller.open_conversation(&ConversationId::new("b")).await });
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert!(harness.push.commands().is_empty());
    assert!(!opening_b.is_finished());

    gate.notify_one();
    opening_a.await.expect("join").expect("open a");
    opening_b.await.expect("join").expect("open b");

    assert_eq!(
        harness.controller.active_conversation().await,
        Some(conversation("b"))
    );
    assert_eq!(
        harness.push.commands(),
        vec![
            "join conversation:a".to_string(),
            "leave conversation:a".to_string(),
            "join conversation:b".to_string(),
        ]
    );
}

#[tokio::test]
async fn older_pages_are_not_requested_twice_concurrently() {
    let harness = harness();
    harness
        .transport
        .set_page("c1", 0, vec![message_in("c1", "m9", "bob", "new")], true);
    harness
        .transport
        .set_page("c1", 1, vec![message_in("c1", "m8", "bob", "old")], false);
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let gate = harness.transport.gate_fetches("c1");

    let controller = harness.controller.clone();
    let first = tokio::spawn(async move { controller.load_older().await });
    wait_for_fetches(&harness, "c1", 2).await;

    assert!(snapshot(&harness).await.loading);
    assert_eq!(
        harness.controller.load_older().await.expect("second"),
        LoadOutcome::Skipped
    );

    gate.notify_one();
    assert_eq!(
        first.await.expect("join").expect("first"),
        LoadOutcome::Applied {
            inserted: 1,
            has_more: false
        }
    );
    assert_eq!(harness.transport.fetch_count("c1"), 2);
}

#[tokio::test]
async fn reopening_the_active_conversation_is_a_no_op() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    assert_eq!(
        harness
            .controller
            .open_conversation(&conversation("C1"))
            .await
            .expect("reopen"),
        LoadOutcome::Skipped
    );
    assert_eq!(harness.transport.fetch_count("c1"), 1);
}

#[tokio::test]
async fn closing_releases_previews_and_orphans_inflight_sends() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let gate = harness.transport.gate_submissions();
    let mut events = harness.controller.subscribe_events();

    let handle = harness
        .controller
        .send(
            &conversation("c1"),
            "hi",
            vec![OutgoingFile::new("a.png", MediaKind::Image, vec![1u8])],
        )
        .await
        .expect("send");
    assert_eq!(harness.previews.live_count(), 1);

    assert!(harness.controller.close_conversation().await);
    assert_eq!(harness.previews.live_count(), 0);
    assert!(harness.controller.snapshot().await.is_none());
    assert!(harness.presenter.calls().contains(&PresenterCall::Reset));
    assert!(!harness.controller.close_conversation().await);

    gate.notify_one();
    assert_eq!(handle.settled().await, Some(SubmissionOutcome::Orphaned));

    let previews = harness
        .sidebar
        .calls()
        .into_iter()
        .filter(|call| *call == SidebarCall::Preview(conversation("c1"), "hi".to_string()))
        .count();
    assert_eq!(previews, 2);
    assert!(harness
        .push
        .commands()
        .contains(&"leave conversation:c1".to_string()));
    assert!(drain(&mut events).contains(&ClientEvent::ConversationClosed {
        conversation_id: conversation("c1")
    }));
}

#[tokio::test]
async fn push_events_without_an_open_conversation_are_dropped() {
    let harness = harness();
    let outcome = harness
        .controller
        .handle_push(PushEvent::MessageCreated(MessageCreated {
            message: message_in("c1", "m1", "bob", "hi"),
            status: None,
        }))
        .await;
    assert_eq!(outcome, PushOutcome::Dropped);
}

#[tokio::test]
async fn malformed_raw_payloads_are_dropped() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let outcome = harness
        .controller
        .handle_raw_push(RawPushEvent::MessageSeen(RawMessageSeen {
            conversation_id: Some("c1".into()),
            ..RawMessageSeen::default()
        }))
        .await;
    assert_eq!(outcome, PushOutcome::Dropped);
}

#[tokio::test]
async fn attached_stream_applies_events_in_arrival_order() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let (tx, rx) = mpsc::channel(8);
    let pump = harness.controller.attach_push_stream(rx);

    for frame in [
        r#"{"type":"message_created","payload":{"conversationId":"C1","messageId":"m1","senderId":"bob","content":"first"}}"#,
        r#"{"type":"MessageCreated","payload":{"ConversationId":"c1","MessageId":"M1","SenderId":"bob","Content":"first"}}"#,
        r#"{"type":"messageCreated","payload":{"conversation_id":"c1","message_id":"m2","sender_id":"bob","content":"second"}}"#,
    ] {
        let raw = serde_json::from_str::<RawPushEvent>(frame).expect("decodes");
        tx.send(raw).await.expect("pump alive");
    }
    drop(tx);
    pump.await.expect("pump finished");

    let view = snapshot(&harness).await;
    assert_eq!(
        view.messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>(),
        vec!["first", "second"]
    );
}

#[tokio::test]
async fn typing_indicator_expires_after_ttl() {
    let harness = harness_with(ClientSettings {
        typing_ttl_ms: 10,
        ..ClientSettings::default()
    });
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");

    let outcome = harness
        .controller
        .handle_push(PushEvent::Typing(TypingNotice {
            conversation_id: conversation("c1"),
            account_id: AccountId::new("bob"),
            member_info: member("Bob"),
        }))
        .await;
    assert_eq!(outcome, PushOutcome::Typing { shown: true });

    let hidden = PresenterCall::HideTyping(AccountId::new("bob"));
    for _ in 0..100 {
        if harness.presenter.calls().contains(&hidden) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("typing indicator was never hidden");
}

#[tokio::test]
async fn own_typing_notices_are_not_shown() {
    let harness = harness();
    harness
        .controller
        .open_conversation(&conversation("c1"))
        .await
        .expect("open");
    let outcome = harness
        .controller
        .handle_push(PushEvent::Typing(TypingNotice {
            conversation_id: conversation("c1"),
            account_id: AccountId::new("ME"),
            member_info: member("Me"),
        }))
        .await;
    assert_eq!(outcome, PushOutcome::Typing { shown: false });
}
