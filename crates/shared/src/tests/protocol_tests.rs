use super::*;

fn parse(raw: &str) -> PushEvent {
    serde_json::from_str::<RawPushEvent>(raw)
        .expect("raw push event")
        .normalize()
        .expect("normalized push event")
}

#[test]
fn normalizes_camel_case_message_created() {
    let event = parse(
        r#"{"type":"messageCreated","payload":{
            "conversationId":"Conv-1","messageId":"M-9","senderId":"Alice",
            "content":"hi","tempCorrelationId":"T-1",
            "sentAt":"2026-01-02T03:04:05Z",
            "mediaItems":[{"remoteUrl":"https://cdn/x.png","type":"Image"}]
        }}"#,
    );

    let PushEvent::MessageCreated(created) = event else {
        panic!("expected message created");
    };
    assert_eq!(created.message.conversation_id.as_str(), "conv-1");
    assert_eq!(created.message.message_id.as_str(), "m-9");
    assert_eq!(created.message.sender_id.as_str(), "alice");
    assert_eq!(
        created.message.temp_correlation_id,
        Some(CorrelationId::new("t-1"))
    );
    assert_eq!(created.message.media.len(), 1);
    assert_eq!(created.message.media[0].kind, MediaKind::Image);
    assert_eq!(created.status, None);
}

#[test]
fn normalizes_pascal_and_snake_case_to_the_same_event() {
    let pascal = parse(
        r#"{"type":"MessageSeen","payload":{
            "ConversationId":"C1","MessageId":"M1","AccountId":"Bob",
            "MemberInfo":{"DisplayName":"Bob"}
        }}"#,
    );
    let snake = parse(
        r#"{"type":"message_seen","payload":{
            "conversation_id":"c1","message_id":"m1","account_id":"bob",
            "member_info":{"display_name":"Bob"}
        }}"#,
    );
    assert_eq!(pascal, snake);
    assert_eq!(pascal.conversation_id().as_str(), "c1");
}

#[test]
fn blank_correlation_id_is_treated_as_absent() {
    let event = parse(
        r#"{"type":"message_created","payload":{
            "conversation_id":"c1","message_id":"m1","sender_id":"a","tempId":"  "
        }}"#,
    );
    let PushEvent::MessageCreated(created) = event else {
        panic!("expected message created");
    };
    assert_eq!(created.message.temp_correlation_id, None);
    assert!(created.message.content.is_empty());
}

#[test]
fn missing_required_ids_are_rejected() {
    let raw: RawPushEvent = serde_json::from_str(
        r#"{"type":"typing","payload":{"conversationId":"c1"}}"#,
    )
    .expect("raw typing");
    assert_eq!(
        raw.normalize(),
        Err(PushPayloadError::MissingField("account_id"))
    );
}

#[test]
fn push_commands_use_tagged_frames() {
    let frame = serde_json::to_string(&PushCommand::Join {
        group: ConversationId::new("C1").push_group(),
    })
    .expect("serialize");
    assert_eq!(frame, r#"{"type":"join","payload":{"group":"conversation:c1"}}"#);
}
