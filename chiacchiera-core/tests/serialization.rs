use chiacchiera_core::*;
use serde_json::{self as json, Value};

fn parse(json_str: &str) -> Value {
    json::from_str(json_str).expect("valid json")
}

fn sample_message() -> Message {
    Message {
        message_id: "33333333-3333-4333-8333-333333333333".to_string(),
        group_id: "22222222-2222-4222-8222-222222222222".to_string(),
        sender_id: "44444444-4444-4444-8444-444444444444".to_string(),
        sender_name: "alice".to_string(),
        sender_avatar: None,
        content: "hello".to_string(),
        kind: MessageKind::Text,
        media_url: None,
        media_type: None,
        reply_to: None,
        reply: None,
        read_by: vec!["44444444-4444-4444-8444-444444444444".to_string()],
        deleted: false,
        deleted_by: None,
        edited: false,
        edited_at: None,
        created_at: "2025-11-02T10:20:35Z".to_string(),
        updated_at: "2025-11-02T10:20:35Z".to_string(),
    }
}

/*
    Obiettivo test: verificare che un ClientFrame "chat message" con requestId venga serializzato
    nell'envelope atteso { type, payload, requestId } con i campi del payload in camelCase,
    e che lo stesso JSON torni allo stesso valore Rust.
*/
#[test]
fn ws_chat_message_frame_roundtrip() {
    let sm = SendMessage {
        group_id: "22222222-2222-4222-8222-222222222222".to_string(),
        content: "ciao".to_string(),
        kind: Some(MessageKind::Text),
        media_url: None,
        media_type: None,
        reply_to: Some("33333333-3333-4333-8333-333333333333".to_string()),
    };
    let frame = ClientFrame::new(ClientEvent::ChatMessage(sm.clone()))
        .with_request_id("11111111-1111-4111-8111-111111111111");

    let s = json::to_string(&frame).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["type"], "chat message");
    assert_eq!(v["requestId"], "11111111-1111-4111-8111-111111111111");
    assert_eq!(v["payload"]["groupId"], sm.group_id);
    assert_eq!(v["payload"]["kind"], "text");
    assert_eq!(v["payload"]["replyTo"], "33333333-3333-4333-8333-333333333333");
    assert!(v["payload"]["mediaUrl"].is_null(), "optional fields are omitted");

    let back: ClientFrame = json::from_str(&s).expect("deserialize");
    assert_eq!(back, frame);
}

/*
    Un client che non vuole ack non manda requestId: il frame deve essere comunque valido.
    Il payload di un "chat message" non contiene il mittente, che arriva dalla sessione.
*/
#[test]
fn ws_frame_without_request_id_parses() {
    let raw = r#"{"type":"joinGroup","payload":{"groupId":"g-1"}}"#;
    let frame: ClientFrame = json::from_str(raw).expect("deserialize");
    assert_eq!(frame.request_id, None);
    assert_eq!(
        frame.event,
        ClientEvent::JoinGroup(GroupRef { group_id: "g-1".to_string() })
    );

    let raw = r#"{"type":"chat message","payload":{"groupId":"g-1","content":"hey","user":{"userId":"spoofed"}}}"#;
    let frame: ClientFrame = json::from_str(raw).expect("deserialize");
    match frame.event {
        ClientEvent::ChatMessage(sm) => {
            assert_eq!(sm.content, "hey");
            assert_eq!(sm.kind, None);
        }
        other => panic!("expected ChatMessage, got {}", other.name()),
    }
}

// isTyping è opzionale e vale true se assente
#[test]
fn ws_typing_defaults_to_typing() {
    let raw = r#"{"type":"user typing","payload":{"groupId":"g-1"}}"#;
    let frame: ClientFrame = json::from_str(raw).expect("deserialize");
    match frame.event {
        ClientEvent::Typing(t) => assert!(t.is_typing),
        other => panic!("expected Typing, got {}", other.name()),
    }
}

#[test]
fn ws_unknown_event_type_is_rejected() {
    let raw = r#"{"type":"dropTables","payload":{}}"#;
    assert!(json::from_str::<ClientFrame>(raw).is_err());
}

/*
    Obiettivo test: verificare che ServerEvent::NewMessage abbia type "newMessage" e che il
    messaggio sia in camelCase, con i campi opzionali omessi e readBy sempre presente.
*/
#[test]
fn ws_new_message_event_shape() {
    let m = sample_message();
    let event = ServerEvent::NewMessage(m.clone());

    let s = json::to_string(&event).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["type"], "newMessage");
    assert_eq!(v["payload"]["messageId"], m.message_id);
    assert_eq!(v["payload"]["senderName"], "alice");
    assert_eq!(v["payload"]["kind"], "text");
    assert_eq!(v["payload"]["readBy"][0], m.sender_id);
    assert_eq!(v["payload"]["deleted"], false);
    assert!(v["payload"]["mediaUrl"].is_null());
    assert!(v["payload"]["editedAt"].is_null());

    let back: ServerEvent = json::from_str(&s).expect("deserialize");
    assert_eq!(back, event);
}

// L'evento in uscita "chat message" porta lo stesso payload di newMessage
#[test]
fn ws_outbound_chat_message_event_shape() {
    let m = sample_message();
    let chat = json::to_value(ServerEvent::ChatMessage(m.clone())).expect("serialize");
    let new = json::to_value(ServerEvent::NewMessage(m)).expect("serialize");

    assert_eq!(chat["type"], "chat message");
    assert_eq!(chat["payload"], new["payload"]);
    assert_eq!(ServerEvent::ChatMessage(sample_message()).name(), "chat message");

    let back: ServerEvent = json::from_value(chat).expect("deserialize");
    assert!(matches!(back, ServerEvent::ChatMessage(_)));
}

// Un reply verso un messaggio cancellato viene reso come tombstone: deleted=true, nessun contenuto
#[test]
fn reply_tombstone_omits_content() {
    let mut m = sample_message();
    m.reply_to = Some("99999999-9999-4999-8999-999999999999".to_string());
    m.reply = Some(ReplyPreview {
        message_id: "99999999-9999-4999-8999-999999999999".to_string(),
        sender_name: "bob".to_string(),
        content: None,
        deleted: true,
    });

    let v = parse(&json::to_string(&m).expect("serialize"));
    assert_eq!(v["reply"]["deleted"], true);
    assert!(v["reply"]["content"].is_null());
    assert_eq!(v["replyTo"], "99999999-9999-4999-8999-999999999999");
}

#[test]
fn ws_read_and_delete_events_use_wire_names() {
    let read = ServerEvent::MessageRead(MessageRead {
        message_id: "m".to_string(),
        group_id: "g".to_string(),
        user_id: "u3".to_string(),
        read_by: vec!["u1".to_string(), "u3".to_string()],
    });
    let v = parse(&json::to_string(&read).expect("serialize"));
    assert_eq!(v["type"], "messageRead");
    assert_eq!(v["payload"]["readBy"], json::json!(["u1", "u3"]));

    let deleted = ServerEvent::MessageDeleted(MessageDeleted {
        message_id: "m".to_string(),
        group_id: "g".to_string(),
        deleted_by: "u1".to_string(),
    });
    let v = parse(&json::to_string(&deleted).expect("serialize"));
    assert_eq!(v["type"], "messageDeleted");
    assert_eq!(v["payload"]["deletedBy"], "u1");

    let typing = ServerEvent::UserTyping(UserTyping {
        group_id: "g".to_string(),
        user_id: "u1".to_string(),
        username: "alice".to_string(),
        is_typing: false,
    });
    let v = parse(&json::to_string(&typing).expect("serialize"));
    assert_eq!(v["type"], "user typing");
    assert_eq!(v["payload"]["isTyping"], false);
}

/*
    Obiettivo test: Verificare che un Ack positivo per un messaggio riporti l'echo del messaggio
    e non contenga il campo error.
*/
#[test]
fn ws_ack_ok_for_message() {
    let m = sample_message();
    let ack = Ack::for_message("req-1", &m);
    let msg = ServerEvent::Ack(ack.clone());

    let s = json::to_string(&msg).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["type"], "ack");
    assert_eq!(v["payload"]["inReplyTo"], "req-1");
    assert_eq!(v["payload"]["status"], "ok");
    assert_eq!(v["payload"]["messageId"], m.message_id);
    assert_eq!(v["payload"]["createdAt"], m.created_at);
    assert!(v["payload"]["error"].is_null());

    let back: ServerEvent = json::from_str(&s).expect("deserialize");
    match back {
        ServerEvent::Ack(ack_back) => assert_eq!(ack_back, ack),
        other => panic!("expected Ack, got {}", other.name()),
    }
}

/*
    Obiettivo test: Verificare che un Ack con status "error" porti il corpo d'errore
    e nessun campo del messaggio.
*/
#[test]
fn ws_ack_error_roundtrip() {
    let err = Error::new(error::codes::UNAUTHORIZED, "not a member");
    let ack = Ack::failed("req-2", err.clone());
    let msg = ServerEvent::Ack(ack.clone());

    let s = json::to_string(&msg).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["payload"]["status"], "error");
    assert_eq!(v["payload"]["error"]["code"], "unauthorized");
    assert!(v["payload"]["messageId"].is_null());

    let back: ServerEvent = json::from_str(&s).expect("deserialize");
    match back {
        ServerEvent::Ack(ack_back) => assert_eq!(ack_back, ack),
        other => panic!("expected Ack, got {}", other.name()),
    }
}

/*
    Obiettivo test:
    verificare che RegisterResponse venga serializzato nel JSON con i nomi campo giusti (camelCase)
*/
#[test]
fn http_register_response_roundtrip() {
    let user = User {
        user_id: "55555555-5555-4555-8555-555555555555".to_string(),
        username: "alice".to_string(),
        avatar_url: Some("https://cdn.example/alice.png".to_string()),
        role: "user".to_string(),
        created_at: "2025-11-02T10:10:10Z".to_string(),
    };
    let resp = RegisterResponse { user: user.clone(), token: "token123".to_string() };

    let s = json::to_string(&resp).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["user"]["userId"], user.user_id);
    assert_eq!(v["user"]["avatarUrl"], "https://cdn.example/alice.png");
    assert_eq!(v["user"]["role"], "user");

    let back: RegisterResponse = json::from_str(&s).expect("deserialize");
    assert_eq!(back.user, user);
    assert_eq!(back.token, "token123");
}

#[test]
fn http_group_response_has_members() {
    let group = Group {
        group_id: "aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa".to_string(),
        name: "general".to_string(),
        creator_id: "u1".to_string(),
        members: vec!["u1".to_string(), "u3".to_string()],
        created_at: "2025-11-02T10:00:00Z".to_string(),
    };
    let resp = GroupResponse { group: group.clone() };

    let v = parse(&json::to_string(&resp).expect("serialize"));
    assert_eq!(v["group"]["creatorId"], "u1");
    assert_eq!(v["group"]["members"], json::json!(["u1", "u3"]));
    assert!(group.has_member("u3"));
    assert!(!group.has_member("u2"));
}

/*
    Obiettivo test:
    verificare l'envelope di paginazione { messages, pagination: { total, page, pages, limit } }
    e il calcolo di pages.
*/
#[test]
fn http_list_messages_pagination_envelope() {
    let resp = ListMessagesResponse {
        messages: vec![sample_message()],
        pagination: Pagination::new(120, 1, 50),
    };

    let s = json::to_string(&resp).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["messages"][0]["messageId"], "33333333-3333-4333-8333-333333333333");
    assert_eq!(v["pagination"]["total"], 120);
    assert_eq!(v["pagination"]["page"], 1);
    assert_eq!(v["pagination"]["pages"], 3);
    assert_eq!(v["pagination"]["limit"], 50);

    let back: ListMessagesResponse = json::from_str(&s).expect("deserialize");
    assert_eq!(back, resp);
}

#[test]
fn pagination_pages_edge_cases() {
    assert_eq!(Pagination::new(0, 1, 50).pages, 0);
    assert_eq!(Pagination::new(50, 1, 50).pages, 1);
    assert_eq!(Pagination::new(51, 2, 50).pages, 2);
}

#[test]
fn http_create_message_request_defaults() {
    let req: CreateMessageRequest =
        json::from_str(r#"{"kind":"image","mediaUrl":"https://cdn/x.png","mediaType":"image/png"}"#)
            .expect("deserialize");
    assert_eq!(req.content, "");
    assert_eq!(req.kind, Some(MessageKind::Image));
    assert!(MessageKind::Image.requires_media());
    assert_eq!(MessageKind::parse("system"), Some(MessageKind::System));
    assert_eq!(MessageKind::parse("video"), None);
}

/*
    Obiettivo test:
    verificare che Error venga serializzato nel JSON con i nomi campo giusti (camelCase)
*/
#[test]
fn ws_error_envelope_roundtrip() {
    let err = Error::new("unauthenticated", "token expired")
        .with_details(json::json!({"reason": "expired", "at": "2025-11-02T11:00:00Z"}));
    let msg = ServerEvent::Error(err.clone());

    let s = json::to_string(&msg).expect("serialize");
    let v = parse(&s);

    assert_eq!(v["type"], "error");
    assert_eq!(v["payload"]["code"], err.code);
    assert_eq!(v["payload"]["message"], err.message);
    assert_eq!(v["payload"]["details"]["reason"], "expired");

    let back: ServerEvent = json::from_str(&s).expect("deserialize");
    match back {
        ServerEvent::Error(err_back) => assert_eq!(err_back, err),
        other => panic!("expected Error envelope, got {}", other.name()),
    }
}
